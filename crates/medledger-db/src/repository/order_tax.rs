//! Order-level tax lines (CGST, SGST, IGST, VAT) frozen at commit.
//!
//! Stored per order so that totals can be recomputed from the database
//! exactly as they were computed at commit, even after the configured tax
//! catalogue changes.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use medledger_core::tax::{TaxLine, TaxStack};
use medledger_core::{Money, OrderKind, Rate, TaxBase, TaxComponent};

fn kind_str(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Sale => "sale",
        OrderKind::Purchase => "purchase",
    }
}

pub(crate) async fn insert_order_taxes(
    conn: &mut SqliteConnection,
    order_id: &str,
    kind: OrderKind,
    lines: &[TaxLine],
) -> DbResult<()> {
    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_taxes (
                id, order_id, order_kind, position, name, rate_bps, base,
                taxable_cents, amount_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(order_id)
        .bind(kind_str(kind))
        .bind(position as i64)
        .bind(&line.name)
        .bind(line.rate.bps())
        .bind(line.base.as_str())
        .bind(line.taxable.cents())
        .bind(line.amount.cents())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub(crate) async fn load_order_taxes(pool: &SqlitePool, order_id: &str) -> DbResult<Vec<TaxLine>> {
    let rows: Vec<(String, u32, String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT name, rate_bps, base, taxable_cents, amount_cents
        FROM order_taxes
        WHERE order_id = ?1
        ORDER BY position
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(name, rate_bps, base, taxable, amount)| {
            let base = TaxBase::parse(&base)
                .ok_or_else(|| DbError::Internal(format!("unknown tax base '{base}'")))?;
            Ok(TaxLine {
                name,
                rate: Rate::from_bps(rate_bps),
                base,
                taxable: Money::from_cents(taxable),
                amount: Money::from_cents(amount),
            })
        })
        .collect()
}

/// Rebuilds the stack that produced `lines`.
pub(crate) fn stack_from_lines(lines: &[TaxLine]) -> TaxStack {
    TaxStack::new(
        lines
            .iter()
            .map(|l| TaxComponent {
                name: l.name.clone(),
                rate: l.rate,
                base: l.base,
            })
            .collect(),
    )
}
