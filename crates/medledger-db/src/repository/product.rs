//! # Product Repository
//!
//! Catalog operations for products.
//!
//! ## Stock Column
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products.stock_quantity                                                │
//! │                                                                         │
//! │  insert()           → 0                                                │
//! │  ledger credit/debit → ± delta, same transaction as the ledger row     │
//! │                                                                         │
//! │  Nothing in this repository writes it, so                              │
//! │  stock_quantity == Σ stock_ledger.delta for the product.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use medledger_core::validation::{validate_non_negative, validate_product_name, validate_sku};
use medledger_core::{CoreError, Money, Product, Rate, ValidationError};

/// Fields supplied when adding a product to the catalog.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub unit_cost: Money,
    pub unit_price: Money,
    pub gst_rate: Rate,
    pub reorder_level: i64,
    pub batch_tracked: bool,
}

impl NewProduct {
    /// A batch-tracked product with no reorder level.
    pub fn new(sku: impl Into<String>, name: impl Into<String>, unit_price: Money) -> Self {
        NewProduct {
            sku: sku.into(),
            name: name.into(),
            unit_cost: Money::zero(),
            unit_price,
            gst_rate: Rate::zero(),
            reorder_level: 0,
            batch_tracked: true,
        }
    }

    pub fn with_cost(mut self, unit_cost: Money) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn with_gst(mut self, gst_rate: Rate) -> Self {
        self.gst_rate = gst_rate;
        self
    }

    pub fn with_reorder_level(mut self, level: i64) -> Self {
        self.reorder_level = level;
        self
    }

    /// Stock is counted per product only.
    pub fn untracked(mut self) -> Self {
        self.batch_tracked = false;
        self
    }
}

pub(crate) const PRODUCT_COLUMNS: &str = r#"
    id, sku, name, unit_cost_cents, unit_price_cents, gst_rate_bps,
    reorder_level, batch_tracked, stock_quantity, version, created_at, updated_at
"#;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product with zero stock.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, new: &NewProduct) -> DbResult<Product> {
        validate_sku(&new.sku)?;
        validate_product_name(&new.name)?;
        validate_non_negative("unit_cost", new.unit_cost)?;
        validate_non_negative("unit_price", new.unit_price)?;
        if new.reorder_level < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "reorder_level".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: new.sku.trim().to_string(),
            name: new.name.trim().to_string(),
            unit_cost_cents: new.unit_cost.cents(),
            unit_price_cents: new.unit_price.cents(),
            gst_rate_bps: new.gst_rate.bps(),
            reorder_level: new.reorder_level,
            batch_tracked: new.batch_tracked,
            stock_quantity: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, unit_cost_cents, unit_price_cents, gst_rate_bps,
                reorder_level, batch_tracked, stock_quantity, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, ?9, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.unit_cost_cents)
        .bind(product.unit_price_cents)
        .bind(product.gst_rate_bps)
        .bind(product.reorder_level)
        .bind(product.batch_tracked)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: product.sku.clone(),
            },
            other => other,
        })?;

        Ok(product)
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by SKU (exact match).
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by ID, failing with `ProductNotFound`.
    pub async fn require(&self, id: &str) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(id.to_string()).into())
    }

    /// Lists products by name.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Current stock of a product. Always equals the product's ledger sum.
    pub async fn get_stock_level(&self, id: &str) -> DbResult<i64> {
        let level: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        level.ok_or_else(|| CoreError::ProductNotFound(id.to_string()).into())
    }

    /// Counts total products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Whether the product's stock is counted per batch.
///
/// Never changes after insert, so write paths read it before opening their
/// transaction.
pub(crate) async fn is_batch_tracked(pool: &SqlitePool, product_id: &str) -> DbResult<bool> {
    let tracked: Option<bool> =
        sqlx::query_scalar("SELECT batch_tracked FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(pool)
            .await?;

    tracked.ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
}

/// Checks that a stock movement names a batch exactly when the product is
/// batch-tracked.
pub(crate) fn check_batch_rule(
    product_id: &str,
    batch_tracked: bool,
    batch_id: Option<&str>,
) -> DbResult<()> {
    match (batch_tracked, batch_id) {
        (true, None) => Err(CoreError::invalid_line(format!(
            "product {product_id} is batch-tracked; a batch is required"
        ))
        .into()),
        (false, Some(_)) => Err(CoreError::invalid_line(format!(
            "product {product_id} is not batch-tracked; no batch may be given"
        ))
        .into()),
        _ => Ok(()),
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
