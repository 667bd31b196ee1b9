//! # Purchase Repository
//!
//! Supplier purchases and their goods receipt (GRN).
//!
//! ## GRN State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  create_purchase()                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AwaitingReceipt ── confirm_grn() ──► Received (terminal)              │
//! │                          │                                              │
//! │                          │ one transaction:                            │
//! │                          │  UPDATE purchases ... WHERE status =        │
//! │                          │         'awaiting_receipt'   (0 rows →      │
//! │                          │         AlreadyReceived / PurchaseNotFound) │
//! │                          │  INSERT grns (UNIQUE purchase_id)           │
//! │                          │  per line: batch (create if new),           │
//! │                          │            ledger (+q, purchase)            │
//! │                                                                         │
//! │  Stock is credited only here, never when the purchase is created.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two racing confirmations serialize on the status update: the first one
//! flips the status, the second matches zero rows and fails with
//! `AlreadyReceived` before touching stock.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::batch::ensure_batch;
use crate::repository::ledger::{self, Movement};
use crate::repository::order_tax::{insert_order_taxes, load_order_taxes};
use crate::repository::product::{check_batch_rule, is_batch_tracked};
use medledger_core::tax::TaxLine;
use medledger_core::validation::{validate_batch_no, validate_quantity};
use medledger_core::{
    compute_line, BatchRef, CoreError, DraftOrder, Grn, Money, OrderKind, Purchase,
    PurchaseLine, Rate, ValidationError,
};

const PURCHASE_COLUMNS: &str = r#"
    id, supplier_name, invoice_no, status, items_total_cents, order_discount_cents,
    total_tax_cents, grand_total_cents, paid_cents, balance_due_cents, version,
    created_at, received_at
"#;

const PURCHASE_LINE_COLUMNS: &str = r#"
    id, purchase_id, line_no, product_id, batch_no, expiry_date, quantity,
    unit_price_cents, discount_bps, gst_bps, line_total_cents
"#;

/// What actually arrived for one purchase line.
///
/// `batch_no` and `expiry_date` override the values on the purchase line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrnLineInput {
    pub purchase_line_id: String,
    pub quantity: i64,
    pub batch_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl GrnLineInput {
    pub fn new(purchase_line_id: impl Into<String>, quantity: i64) -> Self {
        GrnLineInput {
            purchase_line_id: purchase_line_id.into(),
            quantity,
            batch_no: None,
            expiry_date: None,
        }
    }

    pub fn with_batch(mut self, batch_no: impl Into<String>, expiry_date: Option<NaiveDate>) -> Self {
        self.batch_no = Some(batch_no.into());
        self.expiry_date = expiry_date;
        self
    }
}

/// One received line of a GRN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GrnLine {
    pub id: String,
    pub grn_id: String,
    pub purchase_line_id: String,
    pub batch_id: Option<String>,
    pub quantity: i64,
}

/// A purchase line resolved against the GRN input.
struct Receipt {
    line: PurchaseLine,
    quantity: i64,
    batch_no: Option<String>,
    expiry_date: Option<NaiveDate>,
}

/// Repository for purchases and goods receipt.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Persists a draft purchase awaiting receipt. Stock is not touched.
    ///
    /// Lines for batch-tracked products must describe the incoming batch
    /// (`OrderLine::into_batch`).
    pub async fn create_purchase(&self, draft: &DraftOrder) -> DbResult<Purchase> {
        if !draft.kind.requires_grn() {
            return Err(ValidationError::InvalidFormat {
                field: "order kind".to_string(),
                reason: "create_purchase requires a purchase order".to_string(),
            }
            .into());
        }
        draft.validate_for_commit()?;
        let totals = draft.totals()?;

        for line in draft.lines() {
            let tracked = is_batch_tracked(&self.pool, &line.product_id).await?;
            let incoming = match &line.batch {
                Some(BatchRef::Incoming { batch_no, .. }) => Some(batch_no.as_str()),
                _ => None,
            };
            check_batch_rule(&line.product_id, tracked, incoming)?;
        }

        let now = Utc::now();
        let purchase = Purchase {
            id: Uuid::new_v4().to_string(),
            supplier_name: draft.counterparty.clone(),
            invoice_no: draft.invoice_no.clone(),
            status: medledger_core::PurchaseStatus::AwaitingReceipt,
            items_total_cents: totals.items_total.cents(),
            order_discount_cents: totals.order_discount.cents(),
            total_tax_cents: totals.total_tax.cents(),
            grand_total_cents: totals.grand_total.cents(),
            paid_cents: totals.paid.cents(),
            balance_due_cents: totals.balance_due.cents(),
            version: 0,
            created_at: now,
            received_at: None,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, supplier_name, invoice_no, status, items_total_cents,
                order_discount_cents, total_tax_cents, grand_total_cents,
                paid_cents, balance_due_cents, version, created_at
            ) VALUES (?1, ?2, ?3, 'awaiting_receipt', ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.supplier_name)
        .bind(&purchase.invoice_no)
        .bind(purchase.items_total_cents)
        .bind(purchase.order_discount_cents)
        .bind(purchase.total_tax_cents)
        .bind(purchase.grand_total_cents)
        .bind(purchase.paid_cents)
        .bind(purchase.balance_due_cents)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (index, (line, breakdown)) in draft.lines().iter().zip(&totals.lines).enumerate() {
            let (batch_no, expiry_date) = match &line.batch {
                Some(BatchRef::Incoming {
                    batch_no,
                    expiry_date,
                }) => (Some(batch_no.trim()), *expiry_date),
                _ => (None, None),
            };

            sqlx::query(
                r#"
                INSERT INTO purchase_lines (
                    id, purchase_id, line_no, product_id, batch_no, expiry_date,
                    quantity, unit_price_cents, discount_bps, gst_bps, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&purchase.id)
            .bind(index as i64 + 1)
            .bind(&line.product_id)
            .bind(batch_no)
            .bind(expiry_date)
            .bind(line.quantity)
            .bind(line.unit_price.cents())
            .bind(line.discount.bps())
            .bind(line.gst.bps())
            .bind(breakdown.line_total.cents())
            .execute(&mut *tx)
            .await?;
        }

        insert_order_taxes(&mut tx, &purchase.id, OrderKind::Purchase, &totals.order_taxes).await?;

        tx.commit().await?;

        info!(
            purchase_id = %purchase.id,
            lines = draft.line_count(),
            grand_total = %totals.grand_total,
            "Purchase created"
        );

        Ok(purchase)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }

    /// Gets a purchase by ID, failing with `PurchaseNotFound`.
    pub async fn require(&self, id: &str) -> DbResult<Purchase> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::PurchaseNotFound(id.to_string()).into())
    }

    pub async fn get_lines(&self, purchase_id: &str) -> DbResult<Vec<PurchaseLine>> {
        let lines = sqlx::query_as::<_, PurchaseLine>(&format!(
            "SELECT {PURCHASE_LINE_COLUMNS} FROM purchase_lines WHERE purchase_id = ?1 ORDER BY line_no"
        ))
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    pub async fn get_taxes(&self, purchase_id: &str) -> DbResult<Vec<TaxLine>> {
        load_order_taxes(&self.pool, purchase_id).await
    }

    /// Purchases still waiting for their goods, oldest first.
    pub async fn list_awaiting_receipt(&self) -> DbResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE status = 'awaiting_receipt' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(purchases)
    }

    /// The GRN of a purchase, if it was received.
    pub async fn get_grn(&self, purchase_id: &str) -> DbResult<Option<Grn>> {
        let grn = sqlx::query_as::<_, Grn>(
            r#"
            SELECT id, purchase_id, received_lines, received_units, received_value_cents, created_at
            FROM grns
            WHERE purchase_id = ?1
            "#,
        )
        .bind(purchase_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(grn)
    }

    pub async fn get_grn_lines(&self, grn_id: &str) -> DbResult<Vec<GrnLine>> {
        let lines = sqlx::query_as::<_, GrnLine>(
            r#"
            SELECT g.id, g.grn_id, g.purchase_line_id, g.batch_id, g.quantity
            FROM grn_lines g
            JOIN purchase_lines p ON p.id = g.purchase_line_id
            WHERE g.grn_id = ?1
            ORDER BY p.line_no
            "#,
        )
        .bind(grn_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Confirms the goods receipt of a purchase and credits stock.
    ///
    /// An empty `lines` receives every purchase line as ordered. Otherwise
    /// only the listed lines are received, each with `0 < quantity ≤
    /// ordered`.
    ///
    /// ## Errors
    /// * `PurchaseNotFound`
    /// * `AlreadyReceived` - a GRN exists, including one confirmed
    ///   concurrently
    /// * `InvalidLineItem` - unknown or duplicate line, quantity above the
    ///   ordered quantity, missing batch number
    pub async fn confirm_grn(&self, purchase_id: &str, lines: &[GrnLineInput]) -> DbResult<Grn> {
        let mut seen = HashSet::new();
        for input in lines {
            validate_quantity(input.quantity)?;
            if let Some(batch_no) = &input.batch_no {
                validate_batch_no(batch_no)?;
            }
            if !seen.insert(input.purchase_line_id.as_str()) {
                return Err(CoreError::invalid_line(format!(
                    "purchase line {} is listed twice",
                    input.purchase_line_id
                ))
                .into());
            }
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET status = 'received', received_at = ?2, version = version + 1
            WHERE id = ?1 AND status = 'awaiting_receipt'
            "#,
        )
        .bind(purchase_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT status FROM purchases WHERE id = ?1")
                    .bind(purchase_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let err = match exists {
                None => CoreError::PurchaseNotFound(purchase_id.to_string()),
                Some(_) => CoreError::AlreadyReceived {
                    purchase_id: purchase_id.to_string(),
                },
            };
            warn!(purchase_id, error = %err, "GRN rejected");
            return Err(err.into());
        }

        let ordered = sqlx::query_as::<_, PurchaseLine>(&format!(
            "SELECT {PURCHASE_LINE_COLUMNS} FROM purchase_lines WHERE purchase_id = ?1 ORDER BY line_no"
        ))
        .bind(purchase_id)
        .fetch_all(&mut *tx)
        .await?;

        if ordered.is_empty() {
            return Err(CoreError::EmptyOrder.into());
        }

        let receipts = resolve_receipts(purchase_id, ordered, lines)?;

        let mut received_units = 0;
        let mut received_value = Money::zero();
        for receipt in &receipts {
            let line = &receipt.line;
            let breakdown = compute_line(
                receipt.quantity,
                Money::from_cents(line.unit_price_cents),
                Rate::from_bps(line.discount_bps),
                Rate::from_bps(line.gst_bps),
            )?;
            received_units += receipt.quantity;
            received_value += breakdown.line_total;
        }

        let grn = Grn {
            id: Uuid::new_v4().to_string(),
            purchase_id: purchase_id.to_string(),
            received_lines: receipts.len() as i64,
            received_units,
            received_value_cents: received_value.cents(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO grns (
                id, purchase_id, received_lines, received_units, received_value_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&grn.id)
        .bind(&grn.purchase_id)
        .bind(grn.received_lines)
        .bind(grn.received_units)
        .bind(grn.received_value_cents)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for receipt in &receipts {
            let line = &receipt.line;
            let tracked: bool =
                sqlx::query_scalar("SELECT batch_tracked FROM products WHERE id = ?1")
                    .bind(&line.product_id)
                    .fetch_one(&mut *tx)
                    .await?;
            check_batch_rule(&line.product_id, tracked, receipt.batch_no.as_deref())?;

            let batch_id = match receipt.batch_no.as_deref() {
                Some(batch_no) => {
                    // Unit cost net of the line discount, before GST.
                    let unit_cost = compute_line(
                        1,
                        Money::from_cents(line.unit_price_cents),
                        Rate::from_bps(line.discount_bps),
                        Rate::zero(),
                    )?
                    .taxable;
                    Some(
                        ensure_batch(&mut tx, &line.product_id, batch_no, receipt.expiry_date, unit_cost)
                            .await?,
                    )
                }
                None => None,
            };

            ledger::credit(
                &mut tx,
                &Movement::new(
                    &line.product_id,
                    batch_id.as_deref(),
                    receipt.quantity,
                    OrderKind::Purchase.ledger_reason(),
                )
                .for_order(purchase_id),
            )
            .await?;

            sqlx::query(
                r#"
                INSERT INTO grn_lines (id, grn_id, purchase_line_id, batch_id, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&grn.id)
            .bind(&line.id)
            .bind(&batch_id)
            .bind(receipt.quantity)
            .execute(&mut *tx)
            .await?;

            debug!(
                purchase_id,
                purchase_line_id = %line.id,
                quantity = receipt.quantity,
                "GRN line received"
            );
        }

        tx.commit().await?;

        info!(
            purchase_id,
            grn_id = %grn.id,
            received_lines = grn.received_lines,
            received_units = grn.received_units,
            "GRN confirmed"
        );

        Ok(grn)
    }
}

/// Matches GRN input against the ordered lines.
fn resolve_receipts(
    purchase_id: &str,
    ordered: Vec<PurchaseLine>,
    inputs: &[GrnLineInput],
) -> DbResult<Vec<Receipt>> {
    if inputs.is_empty() {
        return Ok(ordered
            .into_iter()
            .map(|line| Receipt {
                quantity: line.quantity,
                batch_no: line.batch_no.clone(),
                expiry_date: line.expiry_date,
                line,
            })
            .collect());
    }

    inputs
        .iter()
        .map(|input| {
            let line = ordered
                .iter()
                .find(|l| l.id == input.purchase_line_id)
                .cloned()
                .ok_or_else(|| {
                    DbError::from(CoreError::invalid_line(format!(
                        "purchase line {} is not part of purchase {purchase_id}",
                        input.purchase_line_id
                    )))
                })?;

            if input.quantity > line.quantity {
                return Err(CoreError::invalid_line(format!(
                    "received quantity {} exceeds ordered quantity {} on line {}",
                    input.quantity, line.quantity, line.line_no
                ))
                .into());
            }

            Ok(Receipt {
                quantity: input.quantity,
                batch_no: input
                    .batch_no
                    .as_ref()
                    .map(|b| b.trim().to_string())
                    .or_else(|| line.batch_no.clone()),
                expiry_date: input.expiry_date.or(line.expiry_date),
                line,
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use medledger_core::tax::{TaxComponent, TaxStack};
    use medledger_core::{OrderLine, PurchaseStatus};

    fn gst_split() -> TaxStack {
        TaxStack::new(vec![
            TaxComponent::cgst(Rate::from_bps(900)),
            TaxComponent::sgst(Rate::from_bps(900)),
        ])
    }

    #[tokio::test]
    async fn test_create_purchase_rejects_sale_draft() {
        let db = fixtures::db().await;
        let mut draft = DraftOrder::sale();
        draft
            .add_line(OrderLine::new("p", 1, Money::from_cents(100)))
            .unwrap();
        let err = db.purchases().create_purchase(&draft).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));
        assert!(db.purchases().list_awaiting_receipt().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_purchase_with_stacked_taxes() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "CFX-200", 15_000, 0).await;

        let mut draft = DraftOrder::purchase().with_counterparty("Medline Distributors");
        draft
            .add_line(
                OrderLine::new(&product.id, 10, Money::from_cents(10_000)).into_batch("CF-24", None),
            )
            .unwrap();
        draft.set_order_discount(Money::from_cents(5_000)).unwrap();
        draft.set_taxes(gst_split());

        let purchase = db.purchases().create_purchase(&draft).await.unwrap();
        assert_eq!(purchase.status, PurchaseStatus::AwaitingReceipt);
        assert_eq!(purchase.items_total_cents, 100_000);
        assert_eq!(purchase.total_tax_cents, 17_100);
        assert_eq!(purchase.grand_total_cents, 112_100);

        let taxes = db.purchases().get_taxes(&purchase.id).await.unwrap();
        assert_eq!(taxes.len(), 2);
        assert_eq!(taxes[0].amount.cents(), 8_550);

        // Creating a purchase does not move stock.
        assert_eq!(db.products().get_stock_level(&product.id).await.unwrap(), 0);
        assert_eq!(db.purchases().list_awaiting_receipt().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tracked_purchase_line_needs_batch() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "CFX-500", 25_000, 0).await;

        let mut draft = DraftOrder::purchase();
        draft
            .add_line(OrderLine::new(&product.id, 5, Money::from_cents(20_000)))
            .unwrap();
        let err = db.purchases().create_purchase(&draft).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidLineItem { .. })));
    }

    #[tokio::test]
    async fn test_double_grn_credits_once() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "MOX-500", 12_000, 0).await;
        let purchase = fixtures::purchase(&db, &product, "MX-7", 24, 8_000).await;

        let grn = db.purchases().confirm_grn(&purchase.id, &[]).await.unwrap();
        assert_eq!(grn.received_lines, 1);
        assert_eq!(grn.received_units, 24);
        assert_eq!(grn.received_value_cents, 192_000);

        let err = db.purchases().confirm_grn(&purchase.id, &[]).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::AlreadyReceived { .. })));

        assert_eq!(db.products().get_stock_level(&product.id).await.unwrap(), 24);
        let received = db.purchases().require(&purchase.id).await.unwrap();
        assert_eq!(received.status, PurchaseStatus::Received);
        assert!(received.received_at.is_some());
        assert_eq!(received.version, 1);

        let batch = db
            .batches()
            .get_by_number(&product.id, "MX-7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.quantity_received, 24);
        assert_eq!(batch.purchase_price_cents, 8_000);

        let grn_lines = db.purchases().get_grn_lines(&grn.id).await.unwrap();
        assert_eq!(grn_lines.len(), 1);
        assert_eq!(grn_lines[0].batch_id.as_deref(), Some(batch.id.as_str()));
        assert_eq!(
            db.purchases().get_grn(&purchase.id).await.unwrap().map(|g| g.id),
            Some(grn.id)
        );
        fixtures::assert_consistent(&db).await;
    }

    #[tokio::test]
    async fn test_unknown_purchase() {
        let db = fixtures::db().await;
        let err = db.purchases().confirm_grn("missing", &[]).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::PurchaseNotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_partial_receipt_with_overrides() {
        let db = fixtures::db().await;
        let first = fixtures::product(&db, "TEL-40", 6_000, 0).await;
        let second = fixtures::product(&db, "AML-5", 3_000, 0).await;

        let mut draft = DraftOrder::purchase();
        draft
            .add_line(
                OrderLine::new(&first.id, 10, Money::from_cents(4_000))
                    .with_discount(Rate::from_bps(1000))
                    .with_gst(Rate::from_bps(1200))
                    .into_batch("TL-1", None),
            )
            .unwrap();
        draft
            .add_line(OrderLine::new(&second.id, 5, Money::from_cents(2_000)).into_batch("AM-1", None))
            .unwrap();
        let purchase = db.purchases().create_purchase(&draft).await.unwrap();
        let lines = db.purchases().get_lines(&purchase.id).await.unwrap();

        let expiry = NaiveDate::from_ymd_opt(2027, 8, 31);
        let grn = db
            .purchases()
            .confirm_grn(
                &purchase.id,
                &[GrnLineInput::new(&lines[0].id, 8).with_batch("TL-1B", expiry)],
            )
            .await
            .unwrap();

        // 8 × 40.00 less 10% = 288.00, plus 12% GST = 322.56
        assert_eq!(grn.received_value_cents, 32_256);
        assert_eq!(grn.received_lines, 1);
        assert_eq!(db.products().get_stock_level(&first.id).await.unwrap(), 8);
        assert_eq!(db.products().get_stock_level(&second.id).await.unwrap(), 0);

        let batch = db
            .batches()
            .get_by_number(&first.id, "TL-1B")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.expiry_date, expiry);
        assert_eq!(batch.purchase_price_cents, 3_600);
        assert!(db.batches().get_by_number(&first.id, "TL-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_receipt_leaves_purchase_open() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "ATV-10", 9_000, 0).await;
        let purchase = fixtures::purchase(&db, &product, "AT-1", 10, 5_000).await;
        let line_id = db.purchases().get_lines(&purchase.id).await.unwrap()[0].id.clone();

        let err = db
            .purchases()
            .confirm_grn(&purchase.id, &[GrnLineInput::new(&line_id, 11)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidLineItem { .. })));

        let err = db
            .purchases()
            .confirm_grn(
                &purchase.id,
                &[GrnLineInput::new(&line_id, 1), GrnLineInput::new(&line_id, 1)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidLineItem { .. })));

        let err = db
            .purchases()
            .confirm_grn(&purchase.id, &[GrnLineInput::new("other-line", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidLineItem { .. })));

        let open = db.purchases().require(&purchase.id).await.unwrap();
        assert_eq!(open.status, PurchaseStatus::AwaitingReceipt);
        assert!(db.purchases().get_grn(&purchase.id).await.unwrap().is_none());
        assert_eq!(db.products().get_stock_level(&product.id).await.unwrap(), 0);

        db.purchases().confirm_grn(&purchase.id, &[]).await.unwrap();
        assert_eq!(db.products().get_stock_level(&product.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_receiving_existing_batch_number() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "LEV-500", 11_000, 0).await;
        let batch_id = fixtures::stocked_batch(&db, &product, "LV-3", 5).await;
        let purchase = fixtures::purchase(&db, &product, "LV-3", 7, 9_999).await;

        db.purchases().confirm_grn(&purchase.id, &[]).await.unwrap();

        let batch = db.batches().get_by_id(&batch_id).await.unwrap().unwrap();
        assert_eq!(batch.quantity_remaining, 12);
        assert_eq!(batch.quantity_received, 12);
        fixtures::assert_consistent(&db).await;
    }
}
