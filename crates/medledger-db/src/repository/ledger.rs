//! # Stock Ledger
//!
//! The only code that changes stock.
//!
//! ## Append Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 credit() / debit() inside a transaction                 │
//! │                                                                         │
//! │  1. batch row     quantity_remaining ± q      (guarded on debit)       │
//! │  2. product row   stock_quantity ± q          (guarded on debit)       │
//! │  3. stock_ledger  INSERT (product, batch, ±q, reason, reference)       │
//! │                                                                         │
//! │  A guard that matches zero rows aborts with InsufficientStock and      │
//! │  the caller's transaction is dropped: nothing it wrote survives.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guarded decrement (`... WHERE quantity_remaining >= q`) is a single
//! compare-and-swap: two terminals selling the last unit of a batch cannot
//! both match it.
//!
//! Ledger rows are never updated or deleted; triggers in the schema enforce
//! this. Corrections are new entries, with `reverses_entry_id` set when they
//! undo a specific entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DbResult;
use medledger_core::{CoreError, LedgerReason, StockLedgerEntry};

// =============================================================================
// Write Helpers
// =============================================================================

/// One stock movement, always expressed as a positive quantity.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Movement<'a> {
    pub product_id: &'a str,
    pub batch_id: Option<&'a str>,
    pub quantity: i64,
    pub reason: LedgerReason,
    pub reference_order_id: Option<&'a str>,
    pub reverses_entry_id: Option<&'a str>,
}

impl<'a> Movement<'a> {
    pub fn new(
        product_id: &'a str,
        batch_id: Option<&'a str>,
        quantity: i64,
        reason: LedgerReason,
    ) -> Self {
        Movement {
            product_id,
            batch_id,
            quantity,
            reason,
            reference_order_id: None,
            reverses_entry_id: None,
        }
    }

    pub fn for_order(mut self, order_id: &'a str) -> Self {
        self.reference_order_id = Some(order_id);
        self
    }

    pub fn reversing(mut self, entry_id: &'a str) -> Self {
        self.reverses_entry_id = Some(entry_id);
        self
    }

    /// Receipts count towards `batches.quantity_received`.
    fn is_receipt(&self) -> bool {
        matches!(self.reason, LedgerReason::Purchase | LedgerReason::OpeningStock)
    }

    fn check_quantity(&self) -> DbResult<()> {
        if self.quantity <= 0 {
            return Err(CoreError::invalid_line(format!(
                "stock movement quantity must be positive, got {}",
                self.quantity
            ))
            .into());
        }
        Ok(())
    }
}

/// Applies an IN movement and appends its entry.
pub(crate) async fn credit(
    conn: &mut SqliteConnection,
    movement: &Movement<'_>,
) -> DbResult<StockLedgerEntry> {
    movement.check_quantity()?;
    let q = movement.quantity;

    if let Some(batch_id) = movement.batch_id {
        let received = if movement.is_receipt() { q } else { 0 };
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET quantity_remaining = quantity_remaining + ?1,
                quantity_received = quantity_received + ?2,
                version = version + 1
            WHERE id = ?3 AND product_id = ?4
            "#,
        )
        .bind(q)
        .bind(received)
        .bind(batch_id)
        .bind(movement.product_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::BatchNotFound(batch_id.to_string()).into());
        }
    }

    let result = sqlx::query(
        r#"
        UPDATE products
        SET stock_quantity = stock_quantity + ?1,
            version = version + 1,
            updated_at = ?2
        WHERE id = ?3
        "#,
    )
    .bind(q)
    .bind(Utc::now())
    .bind(movement.product_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ProductNotFound(movement.product_id.to_string()).into());
    }

    append_entry(conn, movement, q).await
}

/// Applies an OUT movement and appends its entry.
///
/// Fails with `InsufficientStock` when the batch (or, for untracked
/// products, the product) holds fewer than `quantity` units.
pub(crate) async fn debit(
    conn: &mut SqliteConnection,
    movement: &Movement<'_>,
) -> DbResult<StockLedgerEntry> {
    movement.check_quantity()?;
    let q = movement.quantity;

    if let Some(batch_id) = movement.batch_id {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET quantity_remaining = quantity_remaining - ?1,
                version = version + 1
            WHERE id = ?2 AND product_id = ?3 AND quantity_remaining >= ?1
            "#,
        )
        .bind(q)
        .bind(batch_id)
        .bind(movement.product_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<(String, i64)> = sqlx::query_as(
                "SELECT batch_no, quantity_remaining FROM batches WHERE id = ?1 AND product_id = ?2",
            )
            .bind(batch_id)
            .bind(movement.product_id)
            .fetch_optional(&mut *conn)
            .await?;

            return Err(match current {
                None => CoreError::BatchNotFound(batch_id.to_string()),
                Some((batch_no, available)) => {
                    warn!(batch_id, available, requested = q, "Batch stock check failed");
                    CoreError::InsufficientStock {
                        target: format!("batch {batch_no}"),
                        available,
                        requested: q,
                    }
                }
            }
            .into());
        }
    }

    let result = sqlx::query(
        r#"
        UPDATE products
        SET stock_quantity = stock_quantity - ?1,
            version = version + 1,
            updated_at = ?2
        WHERE id = ?3 AND stock_quantity >= ?1
        "#,
    )
    .bind(q)
    .bind(Utc::now())
    .bind(movement.product_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let current: Option<(String, i64)> =
            sqlx::query_as("SELECT sku, stock_quantity FROM products WHERE id = ?1")
                .bind(movement.product_id)
                .fetch_optional(&mut *conn)
                .await?;

        return Err(match current {
            None => CoreError::ProductNotFound(movement.product_id.to_string()),
            Some((sku, available)) => {
                warn!(product_id = movement.product_id, available, requested = q, "Product stock check failed");
                CoreError::InsufficientStock {
                    target: format!("product {sku}"),
                    available,
                    requested: q,
                }
            }
        }
        .into());
    }

    append_entry(conn, movement, -q).await
}

async fn append_entry(
    conn: &mut SqliteConnection,
    movement: &Movement<'_>,
    delta: i64,
) -> DbResult<StockLedgerEntry> {
    let entry = StockLedgerEntry {
        id: Uuid::new_v4().to_string(),
        product_id: movement.product_id.to_string(),
        batch_id: movement.batch_id.map(str::to_string),
        delta,
        reason: movement.reason,
        reference_order_id: movement.reference_order_id.map(str::to_string),
        reverses_entry_id: movement.reverses_entry_id.map(str::to_string),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO stock_ledger (
            id, product_id, batch_id, delta, reason,
            reference_order_id, reverses_entry_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.product_id)
    .bind(&entry.batch_id)
    .bind(entry.delta)
    .bind(entry.reason.as_str())
    .bind(&entry.reference_order_id)
    .bind(&entry.reverses_entry_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    debug!(
        product_id = %entry.product_id,
        batch_id = ?entry.batch_id,
        delta = entry.delta,
        reason = %entry.reason,
        "Ledger entry appended"
    );

    Ok(entry)
}

// =============================================================================
// Consistency Report
// =============================================================================

/// A batch whose stored quantity differs from its ledger sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BatchMismatch {
    pub batch_id: String,
    pub batch_no: String,
    pub quantity_remaining: i64,
    pub ledger_sum: i64,
}

/// Stored stock versus ledger sums for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub product_id: String,
    pub stock_quantity: i64,
    pub ledger_sum: i64,
    pub batch_mismatches: Vec<BatchMismatch>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.stock_quantity == self.ledger_sum && self.batch_mismatches.is_empty()
    }
}

// =============================================================================
// Ledger Repository (read side)
// =============================================================================

const ENTRY_COLUMNS: &str = r#"
    id, product_id, batch_id, delta, reason, reference_order_id, reverses_entry_id, created_at
"#;

/// Read access to the stock ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Entries for a product in `[from, to]`, oldest first. Open bounds
    /// when `None`.
    pub async fn entries_for_product(
        &self,
        product_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let entries = sqlx::query_as::<_, StockLedgerEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM stock_ledger
            WHERE product_id = ?1
              AND (?2 IS NULL OR created_at >= ?2)
              AND (?3 IS NULL OR created_at <= ?3)
            ORDER BY created_at, rowid
            "#
        ))
        .bind(product_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries caused by one sale, purchase or adjustment.
    pub async fn entries_for_reference(&self, order_id: &str) -> DbResult<Vec<StockLedgerEntry>> {
        let entries = sqlx::query_as::<_, StockLedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM stock_ledger WHERE reference_order_id = ?1 ORDER BY created_at, rowid"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Σ delta for a product.
    pub async fn ledger_balance(&self, product_id: &str) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0) FROM stock_ledger WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Σ delta for a batch.
    pub async fn batch_ledger_balance(&self, batch_id: &str) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0) FROM stock_ledger WHERE batch_id = ?1",
        )
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Compares stored stock with the ledger for a product and its batches.
    pub async fn verify_consistency(&self, product_id: &str) -> DbResult<ConsistencyReport> {
        let stock_quantity: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        let stock_quantity =
            stock_quantity.ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let ledger_sum = self.ledger_balance(product_id).await?;

        let batches = sqlx::query_as::<_, BatchMismatch>(
            r#"
            SELECT b.id AS batch_id, b.batch_no, b.quantity_remaining,
                   COALESCE((SELECT SUM(l.delta) FROM stock_ledger l WHERE l.batch_id = b.id), 0)
                       AS ledger_sum
            FROM batches b
            WHERE b.product_id = ?1
            ORDER BY b.batch_no
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let report = ConsistencyReport {
            product_id: product_id.to_string(),
            stock_quantity,
            ledger_sum,
            batch_mismatches: batches
                .into_iter()
                .filter(|b| b.quantity_remaining != b.ledger_sum)
                .collect(),
        };

        if !report.is_consistent() {
            warn!(product_id, ?report, "Stock does not match ledger");
        }

        Ok(report)
    }

    /// Runs [`verify_consistency`](Self::verify_consistency) for every
    /// product and returns the inconsistent ones.
    pub async fn find_inconsistencies(&self) -> DbResult<Vec<ConsistencyReport>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM products ORDER BY sku")
            .fetch_all(&self.pool)
            .await?;

        let mut failing = Vec::new();
        for id in ids {
            let report = self.verify_consistency(&id).await?;
            if !report.is_consistent() {
                failing.push(report);
            }
        }
        Ok(failing)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
