//! # Stock Movements Outside Orders
//!
//! Opening stock, manual adjustments and supplier returns. Each call writes
//! one `stock_adjustments` row and one ledger entry that references it.
//!
//! ```text
//! opening_stock()    +q   opening_stock     (creates the batch if new)
//! adjust(+q)         +q   adjustment        (write-on)
//! adjust(-q)         -q   adjustment        (write-off, guarded)
//! supplier_return()  -q   supplier_return   (guarded)
//! ```

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::batch::ensure_batch;
use crate::repository::ledger::{self, Movement};
use crate::repository::product::{check_batch_rule, is_batch_tracked};
use medledger_core::validation::{validate_non_negative, validate_quantity};
use medledger_core::{CoreError, LedgerReason, Money, StockLedgerEntry, ValidationError};

/// Initial stock for a product, optionally into a named batch.
#[derive(Debug, Clone)]
pub struct OpeningStock {
    pub product_id: String,
    pub batch_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i64,
    /// Recorded as the batch purchase price for new batches.
    pub unit_cost: Money,
}

impl OpeningStock {
    pub fn batch(
        product_id: impl Into<String>,
        batch_no: impl Into<String>,
        expiry_date: Option<NaiveDate>,
        quantity: i64,
        unit_cost: Money,
    ) -> Self {
        OpeningStock {
            product_id: product_id.into(),
            batch_no: Some(batch_no.into()),
            expiry_date,
            quantity,
            unit_cost,
        }
    }

    pub fn untracked(product_id: impl Into<String>, quantity: i64) -> Self {
        OpeningStock {
            product_id: product_id.into(),
            batch_no: None,
            expiry_date: None,
            quantity,
            unit_cost: Money::zero(),
        }
    }
}

/// Result of a stock movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub adjustment_id: String,
    pub batch_id: Option<String>,
    pub entry: StockLedgerEntry,
}

/// Repository for stock movements that are not part of an order.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Loads initial stock.
    pub async fn opening_stock(&self, input: &OpeningStock) -> DbResult<StockMovement> {
        validate_quantity(input.quantity)?;
        validate_non_negative("unit_cost", input.unit_cost)?;
        let tracked = is_batch_tracked(&self.pool, &input.product_id).await?;
        check_batch_rule(&input.product_id, tracked, input.batch_no.as_deref())?;

        let mut tx = self.pool.begin().await?;

        let batch_id = match input.batch_no.as_deref() {
            Some(batch_no) => Some(
                ensure_batch(
                    &mut tx,
                    &input.product_id,
                    batch_no,
                    input.expiry_date,
                    input.unit_cost,
                )
                .await?,
            ),
            None => None,
        };

        let adjustment_id = insert_adjustment(
            &mut tx,
            "opening_stock",
            &input.product_id,
            batch_id.as_deref(),
            input.quantity,
            None,
        )
        .await?;

        let entry = ledger::credit(
            &mut tx,
            &Movement::new(
                &input.product_id,
                batch_id.as_deref(),
                input.quantity,
                LedgerReason::OpeningStock,
            )
            .for_order(&adjustment_id),
        )
        .await?;

        tx.commit().await?;

        info!(
            product_id = %input.product_id,
            batch_id = ?batch_id,
            quantity = input.quantity,
            "Opening stock recorded"
        );

        Ok(StockMovement {
            adjustment_id,
            batch_id,
            entry,
        })
    }

    /// Manual write-on (`delta > 0`) or write-off (`delta < 0`).
    pub async fn adjust(
        &self,
        product_id: &str,
        batch_id: Option<&str>,
        delta: i64,
        note: Option<&str>,
    ) -> DbResult<StockMovement> {
        if delta == 0 {
            return Err(ValidationError::MustBePositive {
                field: "adjustment".to_string(),
            }
            .into());
        }
        validate_quantity(delta.abs())?;
        self.check_target(product_id, batch_id).await?;

        let mut tx = self.pool.begin().await?;
        let adjustment_id =
            insert_adjustment(&mut tx, "adjustment", product_id, batch_id, delta, note).await?;

        let movement = Movement::new(product_id, batch_id, delta.abs(), LedgerReason::Adjustment)
            .for_order(&adjustment_id);
        let entry = if delta > 0 {
            ledger::credit(&mut tx, &movement).await?
        } else {
            ledger::debit(&mut tx, &movement).await?
        };

        tx.commit().await?;

        info!(product_id, batch_id = ?batch_id, delta, "Stock adjusted");

        Ok(StockMovement {
            adjustment_id,
            batch_id: batch_id.map(str::to_string),
            entry,
        })
    }

    /// Sends units back to the supplier.
    pub async fn supplier_return(
        &self,
        product_id: &str,
        batch_id: Option<&str>,
        quantity: i64,
        note: Option<&str>,
    ) -> DbResult<StockMovement> {
        validate_quantity(quantity)?;
        self.check_target(product_id, batch_id).await?;

        let mut tx = self.pool.begin().await?;
        let adjustment_id = insert_adjustment(
            &mut tx,
            "supplier_return",
            product_id,
            batch_id,
            -quantity,
            note,
        )
        .await?;

        let entry = ledger::debit(
            &mut tx,
            &Movement::new(product_id, batch_id, quantity, LedgerReason::SupplierReturn)
                .for_order(&adjustment_id),
        )
        .await?;

        tx.commit().await?;

        info!(product_id, batch_id = ?batch_id, quantity, "Supplier return recorded");

        Ok(StockMovement {
            adjustment_id,
            batch_id: batch_id.map(str::to_string),
            entry,
        })
    }

    /// Product exists, batch rule holds, and the batch belongs to the product.
    async fn check_target(&self, product_id: &str, batch_id: Option<&str>) -> DbResult<()> {
        let tracked = is_batch_tracked(&self.pool, product_id).await?;
        check_batch_rule(product_id, tracked, batch_id)?;

        if let Some(batch_id) = batch_id {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT product_id FROM batches WHERE id = ?1")
                    .bind(batch_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if owner.as_deref() != Some(product_id) {
                return Err(CoreError::BatchNotFound(batch_id.to_string()).into());
            }
        }
        Ok(())
    }
}

async fn insert_adjustment(
    conn: &mut SqliteConnection,
    kind: &str,
    product_id: &str,
    batch_id: Option<&str>,
    delta: i64,
    note: Option<&str>,
) -> DbResult<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO stock_adjustments (id, kind, product_id, batch_id, delta, note, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&id)
    .bind(kind)
    .bind(product_id)
    .bind(batch_id)
    .bind(delta)
    .bind(note)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;

    #[tokio::test]
    async fn test_opening_stock_creates_batch() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "MTF-500", 400, 0).await;
        let expiry = NaiveDate::from_ymd_opt(2027, 1, 31);

        let movement = db
            .stock()
            .opening_stock(&OpeningStock::batch(
                &product.id,
                "MF-1",
                expiry,
                40,
                Money::from_cents(250),
            ))
            .await
            .unwrap();

        assert_eq!(movement.entry.delta, 40);
        assert_eq!(movement.entry.reason, LedgerReason::OpeningStock);
        assert_eq!(
            movement.entry.reference_order_id.as_deref(),
            Some(movement.adjustment_id.as_str())
        );

        let batch_id = movement.batch_id.unwrap();
        let batch = db.batches().get_by_id(&batch_id).await.unwrap().unwrap();
        assert_eq!(batch.quantity_received, 40);
        assert_eq!(batch.quantity_remaining, 40);
        assert_eq!(batch.purchase_price_cents, 250);
        assert_eq!(batch.expiry_date, expiry);
        fixtures::assert_consistent(&db).await;
    }

    #[tokio::test]
    async fn test_opening_stock_requires_batch_for_tracked() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "MTF-850", 600, 0).await;
        let err = db
            .stock()
            .opening_stock(&OpeningStock::untracked(&product.id, 5))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidLineItem { .. })));
    }

    #[tokio::test]
    async fn test_adjustments() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "ASP-75", 200, 0).await;
        let batch_id = fixtures::stocked_batch(&db, &product, "AS-1", 10).await;

        db.stock()
            .adjust(&product.id, Some(&batch_id), 3, Some("found in back room"))
            .await
            .unwrap();
        let write_off = db
            .stock()
            .adjust(&product.id, Some(&batch_id), -5, Some("damaged"))
            .await
            .unwrap();
        assert_eq!(write_off.entry.delta, -5);
        assert_eq!(db.products().get_stock_level(&product.id).await.unwrap(), 8);

        let err = db
            .stock()
            .adjust(&product.id, Some(&batch_id), -9, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock { available: 8, requested: 9, .. })
        ));

        assert!(db.stock().adjust(&product.id, Some(&batch_id), 0, None).await.is_err());

        // Rolled back: no adjustment row for the failed write-off.
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_adjustments WHERE kind = 'adjustment'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rows, 2);
        fixtures::assert_consistent(&db).await;
    }

    #[tokio::test]
    async fn test_supplier_return() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "LOS-50", 700, 0).await;
        let batch_id = fixtures::stocked_batch(&db, &product, "LS-1", 6).await;

        let movement = db
            .stock()
            .supplier_return(&product.id, Some(&batch_id), 4, Some("near expiry"))
            .await
            .unwrap();
        assert_eq!(movement.entry.delta, -4);
        assert_eq!(movement.entry.reason, LedgerReason::SupplierReturn);

        let err = db
            .stock()
            .supplier_return(&product.id, Some(&batch_id), 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InsufficientStock { .. })));
        assert_eq!(db.products().get_stock_level(&product.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batch_of_other_product_is_rejected() {
        let db = fixtures::db().await;
        let first = fixtures::product(&db, "PAN-40", 900, 0).await;
        let second = fixtures::product(&db, "RAB-20", 900, 0).await;
        let batch_id = fixtures::stocked_batch(&db, &first, "PN-1", 5).await;

        let err = db
            .stock()
            .supplier_return(&second.id, Some(&batch_id), 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::BatchNotFound(_))));
    }
}
