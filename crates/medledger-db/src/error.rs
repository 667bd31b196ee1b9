//! # Storage Errors
//!
//! `DbError` is what every repository call returns.
//!
//! ## Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ValidationError ──► CoreError ──────────► DbError::Domain              │
//! │  (field rules)       (stock / GRN / order   (transparent)               │
//! │                       rules)                                            │
//! │                                                                         │
//! │  sqlx::Error ─────────────────────────────► DbError::{UniqueViolation,  │
//! │                                               ForeignKeyViolation,      │
//! │                                               Busy, QueryFailed, …}     │
//! │                                                                         │
//! │  A repository call that returns Err has rolled its transaction back.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use medledger_core::{CoreError, ValidationError};
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// A pricing or stock rule rejected the operation
    /// (`InsufficientStock`, `AlreadyReceived`, `PurchaseNotFound`, …).
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A duplicate SKU, invoice number, batch number or GRN.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The write lock could not be taken within the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Any other statement failure, including CHECK constraints and the
    /// append-only triggers on `stock_ledger`.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No pooled connection became free within the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            _ => None,
        }
    }

    /// True when retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// ## Mapping
/// ```text
/// Database, unique violation        → UniqueViolation { field: "table.column" }
/// Database, foreign key violation   → ForeignKeyViolation
/// Database, SQLITE_BUSY (5, 517)    → Busy
/// Database, anything else           → QueryFailed
/// RowNotFound                       → NotFound
/// PoolTimedOut                      → PoolExhausted
/// ```
///
/// The unique-violation `value` is unknown here; repositories that insert
/// user-chosen keys replace it with the offending value.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();

                if db_err.is_unique_violation() {
                    // "UNIQUE constraint failed: sales.invoice_no"
                    let field = message
                        .rsplit(": ")
                        .next()
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation { message }
                } else if code == "5" || code == "517" || message.contains("database is locked") {
                    DbError::Busy(message)
                } else {
                    DbError::QueryFailed(message)
                }
            }
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::ConfigLoadFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_pass_through() {
        let err: DbError = CoreError::AlreadyReceived {
            purchase_id: "p-1".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Purchase p-1 has already been received");
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::AlreadyReceived { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_wraps_into_domain() {
        let err: DbError = ValidationError::Required {
            field: "sku".to_string(),
        }
        .into();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[test]
    fn test_sqlx_mapping() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_constraint_mapping() {
        let db = crate::Database::new(crate::DbConfig::in_memory()).await.unwrap();

        let insert = "INSERT INTO products (id, sku, name, unit_price_cents, created_at, updated_at) \
                      VALUES (?1, 'DUP-1', 'Dup', 100, '2026-01-01', '2026-01-01')";
        sqlx::query(insert).bind("a").execute(db.pool()).await.unwrap();
        let err: DbError = sqlx::query(insert)
            .bind("b")
            .execute(db.pool())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "products.sku"));

        let err: DbError = sqlx::query(
            "INSERT INTO batches (id, product_id, batch_no, created_at) VALUES ('x', 'nope', 'B', '2026-01-01')",
        )
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
