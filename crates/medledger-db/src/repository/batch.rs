//! # Batch Repository
//!
//! Lookups for manufacturing lots, plus the insert used by goods receipt
//! and opening stock.
//!
//! A batch is identified by `(product_id, batch_no)`. Receiving the same
//! batch number twice credits the existing row; its expiry and purchase
//! price stay as first recorded.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use medledger_core::validation::validate_batch_no;
use medledger_core::{Batch, Money};

const BATCH_COLUMNS: &str = r#"
    id, product_id, batch_no, expiry_date, quantity_received, quantity_remaining,
    purchase_price_cents, version, created_at
"#;

/// Returns the id of the product's batch `batch_no`, creating it empty if
/// it does not exist. Quantities change only through the ledger.
pub(crate) async fn ensure_batch(
    conn: &mut SqliteConnection,
    product_id: &str,
    batch_no: &str,
    expiry_date: Option<NaiveDate>,
    purchase_price: Money,
) -> DbResult<String> {
    validate_batch_no(batch_no)?;
    let batch_no = batch_no.trim();

    let inserted = sqlx::query(
        r#"
        INSERT INTO batches (
            id, product_id, batch_no, expiry_date, quantity_received,
            quantity_remaining, purchase_price_cents, version, created_at
        ) VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, 0, ?6)
        ON CONFLICT (product_id, batch_no) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(product_id)
    .bind(batch_no)
    .bind(expiry_date)
    .bind(purchase_price.cents())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let id: String =
        sqlx::query_scalar("SELECT id FROM batches WHERE product_id = ?1 AND batch_no = ?2")
            .bind(product_id)
            .bind(batch_no)
            .fetch_one(&mut *conn)
            .await?;

    if inserted.rows_affected() > 0 {
        debug!(product_id, batch_no, batch_id = %id, "Batch created");
    }

    Ok(id)
}

/// Repository for batch reads.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Batch>> {
        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(batch)
    }

    pub async fn get_by_number(&self, product_id: &str, batch_no: &str) -> DbResult<Option<Batch>> {
        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE product_id = ?1 AND batch_no = ?2"
        ))
        .bind(product_id)
        .bind(batch_no.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(batch)
    }

    /// Batches of a product that still hold stock, earliest expiry first
    /// (undated batches last). This is the order a counter should pick from.
    pub async fn available_for_product(&self, product_id: &str) -> DbResult<Vec<Batch>> {
        let batches = sqlx::query_as::<_, Batch>(&format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM batches
            WHERE product_id = ?1 AND quantity_remaining > 0
            ORDER BY expiry_date IS NULL, expiry_date, batch_no
            "#
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(batches)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
