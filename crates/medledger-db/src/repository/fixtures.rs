//! Shared setup for repository tests.

use crate::pool::{Database, DbConfig};
use crate::repository::product::NewProduct;
use crate::repository::stock::OpeningStock;
use medledger_core::{DraftOrder, Money, OrderLine, Product, Purchase, Rate};

pub(crate) async fn db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// A batch-tracked product costing half its price.
pub(crate) async fn product(db: &Database, sku: &str, price_cents: i64, gst_bps: u32) -> Product {
    db.products()
        .insert(
            &NewProduct::new(sku, format!("{sku} tablets"), Money::from_cents(price_cents))
                .with_cost(Money::from_cents(price_cents / 2))
                .with_gst(Rate::from_bps(gst_bps))
                .with_reorder_level(5),
        )
        .await
        .unwrap()
}

pub(crate) async fn untracked_product(db: &Database, sku: &str, price_cents: i64) -> Product {
    db.products()
        .insert(
            &NewProduct::new(sku, format!("{sku} pack"), Money::from_cents(price_cents))
                .with_cost(Money::from_cents(price_cents / 2))
                .untracked(),
        )
        .await
        .unwrap()
}

/// Opening stock into a new batch; returns the batch id.
pub(crate) async fn stocked_batch(db: &Database, product: &Product, batch_no: &str, quantity: i64) -> String {
    db.stock()
        .opening_stock(&OpeningStock::batch(
            &product.id,
            batch_no,
            None,
            quantity,
            product.unit_cost(),
        ))
        .await
        .unwrap()
        .batch_id
        .unwrap()
}

pub(crate) async fn untracked_stock(db: &Database, product: &Product, quantity: i64) {
    db.stock()
        .opening_stock(&OpeningStock::untracked(&product.id, quantity))
        .await
        .unwrap();
}

/// A one-line purchase awaiting receipt.
pub(crate) async fn purchase(
    db: &Database,
    product: &Product,
    batch_no: &str,
    quantity: i64,
    unit_price_cents: i64,
) -> Purchase {
    let mut draft = DraftOrder::purchase();
    draft
        .add_line(
            OrderLine::new(&product.id, quantity, Money::from_cents(unit_price_cents))
                .into_batch(batch_no, None),
        )
        .unwrap();
    db.purchases().create_purchase(&draft).await.unwrap()
}

pub(crate) async fn assert_consistent(db: &Database) {
    let failing = db.ledger().find_inconsistencies().await.unwrap();
    assert!(failing.is_empty(), "stock differs from ledger: {failing:?}");
}
