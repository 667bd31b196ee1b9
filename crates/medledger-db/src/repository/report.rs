//! # Reports
//!
//! Read-only aggregates over the stock ledger for reports and reorder
//! screens. Nothing here writes.
//!
//! ## Consumption
//! ```text
//! consumed(window) = − Σ delta  where reason ∈ {sale, sales_return}
//!                               and  as_of − window < created_at ≤ as_of
//!
//! sale          -5   ─┐
//! sales_return  +1    ├─► consumed = 4
//! void reversal +0    │   (a void adds +q under reason sale, netting
//! ...                ─┘    the original out)
//! ```
//!
//! Cost of goods sold is the same sum weighted by the batch purchase price
//! (product unit cost for untracked stock).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::product::PRODUCT_COLUMNS;
use medledger_core::validation::validate_window_days;
use medledger_core::{CoreError, DaysOfSupply, LedgerReason, Money, Product, StockSnapshot};

/// IN and OUT units for one reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonTotals {
    pub reason: LedgerReason,
    pub units_in: i64,
    pub units_out: i64,
}

impl ReasonTotals {
    pub fn net(&self) -> i64 {
        self.units_in - self.units_out
    }
}

/// Movements of a product over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSummary {
    pub product_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub by_reason: Vec<ReasonTotals>,
}

impl MovementSummary {
    pub fn units_in(&self) -> i64 {
        self.by_reason.iter().map(|r| r.units_in).sum()
    }

    pub fn units_out(&self) -> i64 {
        self.by_reason.iter().map(|r| r.units_out).sum()
    }

    pub fn net(&self) -> i64 {
        self.units_in() - self.units_out()
    }

    pub fn for_reason(&self, reason: LedgerReason) -> Option<&ReasonTotals> {
        self.by_reason.iter().find(|r| r.reason == reason)
    }
}

/// A batch with stock that expires within the alert horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExpiringBatch {
    pub batch_id: String,
    pub product_id: String,
    pub sku: String,
    pub product_name: String,
    pub batch_no: String,
    pub expiry_date: NaiveDate,
    pub quantity_remaining: i64,
    pub purchase_price_cents: i64,
}

impl ExpiringBatch {
    /// Negative once expired.
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    /// Stock value at purchase price.
    pub fn value(&self) -> Money {
        Money::from_cents(self.purchase_price_cents) * self.quantity_remaining
    }
}

/// Ledger-derived cost of goods sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostOfGoodsSold {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Units sold net of returns and voids.
    pub units_sold: i64,
    pub cost: Money,
}

/// Repository for read-only report queries.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Current stock and consumption over the `window_days` before `as_of`.
    pub async fn stock_snapshot(
        &self,
        product_id: &str,
        window_days: u32,
        as_of: DateTime<Utc>,
    ) -> DbResult<StockSnapshot> {
        validate_window_days(window_days)?;

        let product: Option<(i64, i64)> =
            sqlx::query_as("SELECT stock_quantity, reorder_level FROM products WHERE id = ?1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        let (current_stock, reorder_level) =
            product.ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let since = as_of - Duration::days(i64::from(window_days));
        let consumed: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(-SUM(delta), 0)
            FROM stock_ledger
            WHERE product_id = ?1
              AND reason IN ('sale', 'sales_return')
              AND created_at > ?2
              AND created_at <= ?3
            "#,
        )
        .bind(product_id)
        .bind(since)
        .bind(as_of)
        .fetch_one(&self.pool)
        .await?;

        debug!(product_id, window_days, consumed, "Computed stock snapshot");

        Ok(StockSnapshot::compute(
            product_id,
            current_stock,
            reorder_level,
            consumed,
            window_days,
        )?)
    }

    /// Snapshots for every product at or below its reorder level, the
    /// fastest to run out first.
    pub async fn reorder_suggestions(
        &self,
        window_days: u32,
        as_of: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<StockSnapshot>> {
        let mut snapshots = Vec::new();
        for product in self.low_stock(limit).await? {
            snapshots.push(self.stock_snapshot(&product.id, window_days, as_of).await?);
        }
        snapshots.sort_by(|a, b| supply_days(a).total_cmp(&supply_days(b)));
        Ok(snapshots)
    }

    /// IN, OUT and net units per reason in `[from, to]`.
    pub async fn movement_summary(
        &self,
        product_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<MovementSummary> {
        let rows: Vec<(LedgerReason, i64, i64)> = sqlx::query_as(
            r#"
            SELECT reason,
                   COALESCE(SUM(CASE WHEN delta > 0 THEN delta ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN delta < 0 THEN -delta ELSE 0 END), 0)
            FROM stock_ledger
            WHERE product_id = ?1 AND created_at >= ?2 AND created_at <= ?3
            GROUP BY reason
            ORDER BY reason
            "#,
        )
        .bind(product_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(MovementSummary {
            product_id: product_id.to_string(),
            from,
            to,
            by_reason: rows
                .into_iter()
                .map(|(reason, units_in, units_out)| ReasonTotals {
                    reason,
                    units_in,
                    units_out,
                })
                .collect(),
        })
    }

    /// Products with `stock_quantity ≤ reorder_level`, furthest below first.
    pub async fn low_stock(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE stock_quantity <= reorder_level
            ORDER BY stock_quantity - reorder_level, sku
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Batches with stock expiring on or before `today + within_days`,
    /// soonest first. Already expired batches are included.
    pub async fn expiring_batches(
        &self,
        within_days: u32,
        today: NaiveDate,
    ) -> DbResult<Vec<ExpiringBatch>> {
        let horizon = today + Duration::days(i64::from(within_days));

        let batches = sqlx::query_as::<_, ExpiringBatch>(
            r#"
            SELECT b.id AS batch_id, b.product_id, p.sku, p.name AS product_name,
                   b.batch_no, b.expiry_date, b.quantity_remaining, b.purchase_price_cents
            FROM batches b
            JOIN products p ON p.id = b.product_id
            WHERE b.quantity_remaining > 0
              AND b.expiry_date IS NOT NULL
              AND b.expiry_date <= ?1
            ORDER BY b.expiry_date, p.sku, b.batch_no
            "#,
        )
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        Ok(batches)
    }

    /// Cost of goods sold in `[from, to]`, from the ledger.
    pub async fn cost_of_goods_sold(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<CostOfGoodsSold> {
        let (units_sold, cost_cents): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(-l.delta), 0),
                   COALESCE(SUM(-l.delta * COALESCE(b.purchase_price_cents, p.unit_cost_cents)), 0)
            FROM stock_ledger l
            JOIN products p ON p.id = l.product_id
            LEFT JOIN batches b ON b.id = l.batch_id
            WHERE l.reason IN ('sale', 'sales_return')
              AND l.created_at >= ?1
              AND l.created_at <= ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(CostOfGoodsSold {
            from,
            to,
            units_sold,
            cost: Money::from_cents(cost_cents),
        })
    }
}

fn supply_days(snapshot: &StockSnapshot) -> f64 {
    match snapshot.days_of_supply {
        DaysOfSupply::Finite(days) => days,
        DaysOfSupply::Unbounded => f64::INFINITY,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::repository::sale::ReturnLine;
    use crate::repository::stock::OpeningStock;
    use medledger_core::{DraftOrder, OrderLine};

    async fn sell(db: &crate::Database, product: &Product, batch_id: Option<&str>, qty: i64) -> String {
        let mut line = OrderLine::from_product(product, qty);
        if let Some(batch_id) = batch_id {
            line = line.from_batch(batch_id);
        }
        let mut draft = DraftOrder::sale();
        draft.add_line(line).unwrap();
        db.sales().commit_sale(&draft).await.unwrap().id
    }

    fn around_now() -> (DateTime<Utc>, DateTime<Utc>) {
        (Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn test_stock_snapshot() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "MET-25", 500, 0).await;
        let batch_id = fixtures::stocked_batch(&db, &product, "MT-1", 100).await;

        sell(&db, &product, Some(&batch_id), 20).await;
        sell(&db, &product, Some(&batch_id), 10).await;

        let as_of = Utc::now() + Duration::seconds(1);
        let snap = db.reports().stock_snapshot(&product.id, 30, as_of).await.unwrap();
        assert_eq!(snap.current_stock, 70);
        assert_eq!(snap.units_consumed, 30);
        assert!((snap.avg_daily_consumption - 1.0).abs() < 1e-9);
        assert_eq!(snap.days_of_supply, DaysOfSupply::Finite(70.0));

        // Sales outside the window do not count.
        let later = Utc::now() + Duration::days(45);
        let snap = db.reports().stock_snapshot(&product.id, 30, later).await.unwrap();
        assert_eq!(snap.units_consumed, 0);
        assert_eq!(snap.days_of_supply, DaysOfSupply::Unbounded);

        assert!(db.reports().stock_snapshot(&product.id, 0, as_of).await.is_err());
        assert!(db.reports().stock_snapshot("missing", 30, as_of).await.is_err());
    }

    #[tokio::test]
    async fn test_voids_and_returns_net_out_of_consumption() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "ENA-5", 800, 0).await;
        let batch_id = fixtures::stocked_batch(&db, &product, "EN-1", 50).await;

        let voided = sell(&db, &product, Some(&batch_id), 10).await;
        db.sales().void_sale(&voided).await.unwrap();

        let kept = sell(&db, &product, Some(&batch_id), 6).await;
        let line_id = db.sales().get_lines(&kept).await.unwrap()[0].id.clone();
        db.sales()
            .return_items(&kept, &[ReturnLine { sale_line_id: line_id, quantity: 2 }])
            .await
            .unwrap();

        let as_of = Utc::now() + Duration::seconds(1);
        let snap = db.reports().stock_snapshot(&product.id, 7, as_of).await.unwrap();
        assert_eq!(snap.units_consumed, 4);
        assert_eq!(snap.current_stock, 46);

        let (from, to) = around_now();
        let cogs = db.reports().cost_of_goods_sold(from, to).await.unwrap();
        assert_eq!(cogs.units_sold, 4);
        assert_eq!(cogs.cost.cents(), 4 * 400);
    }

    #[tokio::test]
    async fn test_cogs_uses_batch_price_then_unit_cost() {
        let db = fixtures::db().await;
        let tracked = fixtures::product(&db, "PRD-5", 1_000, 0).await;
        let untracked = fixtures::untracked_product(&db, "SYR-1", 600).await;

        let cheap = db
            .stock()
            .opening_stock(&OpeningStock::batch(&tracked.id, "PR-A", None, 10, Money::from_cents(300)))
            .await
            .unwrap()
            .batch_id
            .unwrap();
        let dear = db
            .stock()
            .opening_stock(&OpeningStock::batch(&tracked.id, "PR-B", None, 10, Money::from_cents(450)))
            .await
            .unwrap()
            .batch_id
            .unwrap();
        fixtures::untracked_stock(&db, &untracked, 10).await;

        sell(&db, &tracked, Some(&cheap), 2).await;
        sell(&db, &tracked, Some(&dear), 1).await;
        sell(&db, &untracked, None, 3).await;

        let (from, to) = around_now();
        let cogs = db.reports().cost_of_goods_sold(from, to).await.unwrap();
        assert_eq!(cogs.units_sold, 6);
        // 2 × 3.00 + 1 × 4.50 + 3 × 3.00
        assert_eq!(cogs.cost.cents(), 600 + 450 + 900);

        let past = Utc::now() - Duration::days(10);
        let empty = db
            .reports()
            .cost_of_goods_sold(past - Duration::days(1), past)
            .await
            .unwrap();
        assert_eq!(empty.units_sold, 0);
        assert!(empty.cost.is_zero());
    }

    #[tokio::test]
    async fn test_movement_summary() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "FLU-20", 2_000, 0).await;
        let batch_id = fixtures::stocked_batch(&db, &product, "FL-1", 30).await;
        let purchase = fixtures::purchase(&db, &product, "FL-2", 12, 1_100).await;
        db.purchases().confirm_grn(&purchase.id, &[]).await.unwrap();
        sell(&db, &product, Some(&batch_id), 7).await;
        db.stock()
            .adjust(&product.id, Some(&batch_id), -1, Some("broken strip"))
            .await
            .unwrap();

        let (from, to) = around_now();
        let summary = db.reports().movement_summary(&product.id, from, to).await.unwrap();
        assert_eq!(summary.units_in(), 42);
        assert_eq!(summary.units_out(), 8);
        assert_eq!(summary.net(), 34);
        assert_eq!(summary.for_reason(LedgerReason::Purchase).map(|r| r.units_in), Some(12));
        assert_eq!(summary.for_reason(LedgerReason::Sale).map(|r| r.net()), Some(-7));
        assert!(summary.for_reason(LedgerReason::SupplierReturn).is_none());
        assert_eq!(
            db.ledger().ledger_balance(&product.id).await.unwrap(),
            summary.net()
        );
    }

    #[tokio::test]
    async fn test_low_stock_and_reorder_suggestions() {
        let db = fixtures::db().await;
        // fixtures use a reorder level of 5
        let low = fixtures::product(&db, "LOW-1", 100, 0).await;
        let empty = fixtures::product(&db, "LOW-0", 100, 0).await;
        let plenty = fixtures::product(&db, "OK-1", 100, 0).await;
        let low_batch = fixtures::stocked_batch(&db, &low, "L-1", 8).await;
        fixtures::stocked_batch(&db, &plenty, "K-1", 50).await;
        sell(&db, &low, Some(&low_batch), 4).await;

        let products = db.reports().low_stock(10).await.unwrap();
        let skus: Vec<&str> = products.iter().map(|p| p.sku.as_str()).collect();
        assert_eq!(skus, vec!["LOW-0", "LOW-1"]);

        let suggestions = db
            .reports()
            .reorder_suggestions(30, Utc::now() + Duration::seconds(1), 10)
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].product_id, low.id);
        assert_eq!(suggestions[1].product_id, empty.id);
        assert!(suggestions.iter().all(|s| s.needs_reorder()));
    }

    #[tokio::test]
    async fn test_expiring_batches() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "INS-G", 30_000, 0).await;
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        for (batch_no, expiry, qty) in [
            ("G-OLD", NaiveDate::from_ymd_opt(2025, 12, 15), 2),
            ("G-SOON", NaiveDate::from_ymd_opt(2026, 2, 1), 5),
            ("G-LATE", NaiveDate::from_ymd_opt(2027, 1, 1), 9),
            ("G-NONE", None, 1),
        ] {
            db.stock()
                .opening_stock(&OpeningStock::batch(&product.id, batch_no, expiry, qty, Money::from_cents(20_000)))
                .await
                .unwrap();
        }

        let expiring = db.reports().expiring_batches(90, today).await.unwrap();
        let numbers: Vec<&str> = expiring.iter().map(|b| b.batch_no.as_str()).collect();
        assert_eq!(numbers, vec!["G-OLD", "G-SOON"]);
        assert_eq!(expiring[0].days_to_expiry(today), -17);
        assert_eq!(expiring[1].days_to_expiry(today), 31);
        assert_eq!(expiring[1].value().cents(), 100_000);
        assert_eq!(expiring[0].product_name, "INS-G tablets");
    }
}
