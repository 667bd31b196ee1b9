//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite/` are compiled into the binary and
//! applied by [`Database::new`](crate::Database::new).
//!
//! ```text
//! 001_initial_schema.sql
//!   products, batches              catalog and per-batch stock
//!   stock_ledger (+ triggers)      append-only movements
//!   sales, sale_lines, installments
//!   purchases, purchase_lines, grns, grn_lines
//!   order_taxes, stock_adjustments
//! ```
//!
//! Applied versions are recorded in `_sqlx_migrations`. Existing files are
//! never edited; changes go in a new `NNN_description.sql`. No migration
//! may update or delete `stock_ledger` rows.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every pending migration in order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(embedded = MIGRATOR.migrations.len(), "Checking schema version");

    MIGRATOR.run(pool).await?;

    info!("Schema is up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts. A database that was never
/// migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let embedded = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((embedded, applied as usize))
}
