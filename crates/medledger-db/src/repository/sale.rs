//! # Sale Repository
//!
//! Commits draft sales and handles what can happen to them afterwards.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  DraftOrder (memory only)                                              │
//! │     │                                                                   │
//! │     │ commit_sale()   one transaction:                                 │
//! │     │   INSERT sales                                                   │
//! │     │   per line: INSERT sale_lines, guarded batch/product debit,      │
//! │     │             ledger entry (-q, sale)                              │
//! │     │   INSERT order_taxes, installments                               │
//! │     ▼                                                                   │
//! │  Committed ──── return_items() ──► ledger (+q, sales_return)           │
//! │     │                                                                   │
//! │     │ void_sale()  (only while nothing was returned)                   │
//! │     ▼                                                                   │
//! │  Voided     one reversing entry (+q) per original sale entry           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failing line rejects the whole sale: the transaction is dropped and
//! no sale, line or ledger row remains.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::ledger::{self, Movement};
use crate::repository::order_tax::{insert_order_taxes, load_order_taxes, stack_from_lines};
use crate::repository::product::{check_batch_rule, is_batch_tracked};
use medledger_core::tax::TaxLine;
use medledger_core::validation::validate_quantity;
use medledger_core::{
    compute_order_totals, CoreError, DraftOrder, InstallmentLine, LedgerReason, Money, OrderKind,
    OrderLine, OrderTotals, Rate, Sale, SaleLine, SaleStatus, StockLedgerEntry, ValidationError,
};

const SALE_COLUMNS: &str = r#"
    id, invoice_no, customer_name, status, items_total_cents, order_discount_cents,
    total_tax_cents, grand_total_cents, paid_cents, balance_due_cents, emi_months,
    created_at, voided_at
"#;

const SALE_LINE_COLUMNS: &str = r#"
    id, sale_id, line_no, product_id, batch_id, quantity, unit_price_cents,
    discount_bps, gst_bps, taxable_cents, tax_cents, line_total_cents, returned_quantity
"#;

/// Units of one sale line coming back from the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub sale_line_id: String,
    pub quantity: i64,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Commits a draft sale.
    ///
    /// ## Errors
    /// * `InsufficientStock` - a line asks for more than its batch holds
    /// * `InvalidLineItem` - a batch-tracked product without a batch, or
    ///   a batch on an untracked product
    /// * `EmptyOrder`, `DiscountExceedsTotal`, … - from draft validation
    /// * `UniqueViolation` - the invoice number is taken
    pub async fn commit_sale(&self, draft: &DraftOrder) -> DbResult<Sale> {
        if draft.kind.requires_grn() {
            return Err(ValidationError::InvalidFormat {
                field: "order kind".to_string(),
                reason: "purchases are received through a GRN, not committed as sales".to_string(),
            }
            .into());
        }
        draft.validate_for_commit()?;
        let totals = draft.totals()?;

        let mut tracked = HashMap::new();
        for line in draft.lines() {
            if !tracked.contains_key(&line.product_id) {
                let flag = is_batch_tracked(&self.pool, &line.product_id).await?;
                tracked.insert(line.product_id.clone(), flag);
            }
            let flag = tracked.get(&line.product_id).copied().unwrap_or(true);
            check_batch_rule(&line.product_id, flag, line.batch_id())?;
        }

        let now = Utc::now();
        let installments = draft.installments(now.date_naive())?;
        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            invoice_no: draft
                .invoice_no
                .clone()
                .unwrap_or_else(|| generate_invoice_no(now)),
            customer_name: draft.counterparty.clone(),
            status: SaleStatus::Committed,
            items_total_cents: totals.items_total.cents(),
            order_discount_cents: totals.order_discount.cents(),
            total_tax_cents: totals.total_tax.cents(),
            grand_total_cents: totals.grand_total.cents(),
            paid_cents: totals.paid.cents(),
            balance_due_cents: totals.balance_due.cents(),
            emi_months: draft.emi_months(),
            created_at: now,
            voided_at: None,
        };

        debug!(sale_id = %sale.id, lines = draft.line_count(), "Committing sale");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, invoice_no, customer_name, status, items_total_cents,
                order_discount_cents, total_tax_cents, grand_total_cents,
                paid_cents, balance_due_cents, emi_months, created_at
            ) VALUES (?1, ?2, ?3, 'committed', ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.invoice_no)
        .bind(&sale.customer_name)
        .bind(sale.items_total_cents)
        .bind(sale.order_discount_cents)
        .bind(sale.total_tax_cents)
        .bind(sale.grand_total_cents)
        .bind(sale.paid_cents)
        .bind(sale.balance_due_cents)
        .bind(sale.emi_months)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: sale.invoice_no.clone(),
            },
            other => other,
        })?;

        for (index, (line, breakdown)) in draft.lines().iter().zip(&totals.lines).enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_lines (
                    id, sale_id, line_no, product_id, batch_id, quantity,
                    unit_price_cents, discount_bps, gst_bps, taxable_cents,
                    tax_cents, line_total_cents, returned_quantity
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&sale.id)
            .bind(index as i64 + 1)
            .bind(&line.product_id)
            .bind(line.batch_id())
            .bind(line.quantity)
            .bind(line.unit_price.cents())
            .bind(line.discount.bps())
            .bind(line.gst.bps())
            .bind(breakdown.taxable.cents())
            .bind(breakdown.tax_amount.cents())
            .bind(breakdown.line_total.cents())
            .execute(&mut *tx)
            .await?;

            let movement = Movement::new(
                &line.product_id,
                line.batch_id(),
                line.quantity,
                draft.kind.ledger_reason(),
            )
            .for_order(&sale.id);

            if let Err(err) = ledger::debit(&mut tx, &movement).await {
                warn!(sale_id = %sale.id, line_no = index + 1, error = %err, "Sale rejected");
                return Err(err);
            }
        }

        insert_order_taxes(&mut tx, &sale.id, OrderKind::Sale, &totals.order_taxes).await?;

        if let Some(schedule) = &installments {
            for installment in schedule {
                sqlx::query(
                    r#"
                    INSERT INTO installments (id, sale_id, due_index, due_date, amount_cents)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&sale.id)
                .bind(installment.due_index)
                .bind(installment.due_date)
                .bind(installment.amount.cents())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            invoice_no = %sale.invoice_no,
            grand_total = %totals.grand_total,
            units = draft.total_quantity(),
            "Sale committed"
        );

        Ok(sale)
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets a sale by ID, failing with `SaleNotFound`.
    pub async fn require(&self, id: &str) -> DbResult<Sale> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(id.to_string()).into())
    }

    pub async fn get_lines(&self, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(&format!(
            "SELECT {SALE_LINE_COLUMNS} FROM sale_lines WHERE sale_id = ?1 ORDER BY line_no"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// The EMI schedule stored with the sale (empty without EMI).
    pub async fn get_installments(&self, sale_id: &str) -> DbResult<Vec<InstallmentLine>> {
        let rows: Vec<(u32, chrono::NaiveDate, i64)> = sqlx::query_as(
            r#"
            SELECT due_index, due_date, amount_cents
            FROM installments
            WHERE sale_id = ?1
            ORDER BY due_index
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(due_index, due_date, amount)| InstallmentLine {
                due_index,
                due_date,
                amount: Money::from_cents(amount),
            })
            .collect())
    }

    /// Order-level tax lines stored at commit.
    pub async fn get_taxes(&self, sale_id: &str) -> DbResult<Vec<TaxLine>> {
        load_order_taxes(&self.pool, sale_id).await
    }

    /// Recomputes the totals of a committed sale from its stored lines and
    /// tax components.
    pub async fn recompute_totals(&self, sale_id: &str) -> DbResult<OrderTotals> {
        let sale = self.require(sale_id).await?;
        let lines: Vec<OrderLine> = self
            .get_lines(sale_id)
            .await?
            .into_iter()
            .map(|l| {
                OrderLine::new(l.product_id, l.quantity, Money::from_cents(l.unit_price_cents))
                    .with_discount(Rate::from_bps(l.discount_bps))
                    .with_gst(Rate::from_bps(l.gst_bps))
            })
            .collect();
        let stack = stack_from_lines(&self.get_taxes(sale_id).await?);

        Ok(compute_order_totals(
            &lines,
            Money::from_cents(sale.order_discount_cents),
            &stack,
            Money::from_cents(sale.paid_cents),
        )?)
    }

    /// Takes units back from the customer into the batch they were sold from.
    ///
    /// ## Errors
    /// * `SaleNotFound`, `InvalidSaleStatus` (voided sale)
    /// * `ReturnExceedsSold` - more than sold minus earlier returns
    pub async fn return_items(
        &self,
        sale_id: &str,
        lines: &[ReturnLine],
    ) -> DbResult<Vec<StockLedgerEntry>> {
        if lines.is_empty() {
            return Err(CoreError::EmptyOrder.into());
        }
        for line in lines {
            validate_quantity(line.quantity)?;
        }

        let mut tx = self.pool.begin().await?;
        let mut entries = Vec::with_capacity(lines.len());

        for line in lines {
            let result = sqlx::query(
                r#"
                UPDATE sale_lines
                SET returned_quantity = returned_quantity + ?1
                WHERE id = ?2
                  AND sale_id = ?3
                  AND quantity - returned_quantity >= ?1
                  AND EXISTS (SELECT 1 FROM sales WHERE id = ?3 AND status = 'committed')
                "#,
            )
            .bind(line.quantity)
            .bind(&line.sale_line_id)
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let state: Option<(SaleStatus, Option<i64>, Option<i64>)> = sqlx::query_as(
                    r#"
                    SELECT s.status, l.quantity, l.returned_quantity
                    FROM sales s
                    LEFT JOIN sale_lines l ON l.id = ?2 AND l.sale_id = s.id
                    WHERE s.id = ?1
                    "#,
                )
                .bind(sale_id)
                .bind(&line.sale_line_id)
                .fetch_optional(&mut *tx)
                .await?;

                let err: DbError = match state {
                    None => CoreError::SaleNotFound(sale_id.to_string()).into(),
                    Some((SaleStatus::Voided, _, _)) => CoreError::InvalidSaleStatus {
                        sale_id: sale_id.to_string(),
                        current_status: SaleStatus::Voided.to_string(),
                    }
                    .into(),
                    Some((_, Some(sold), Some(returned))) => CoreError::ReturnExceedsSold {
                        sale_line_id: line.sale_line_id.clone(),
                        returnable: sold - returned,
                        requested: line.quantity,
                    }
                    .into(),
                    Some(_) => DbError::not_found("Sale line", line.sale_line_id.as_str()),
                };
                warn!(sale_id, sale_line_id = %line.sale_line_id, error = %err, "Return rejected");
                return Err(err);
            }

            let (product_id, batch_id): (String, Option<String>) =
                sqlx::query_as("SELECT product_id, batch_id FROM sale_lines WHERE id = ?1")
                    .bind(&line.sale_line_id)
                    .fetch_one(&mut *tx)
                    .await?;

            let movement = Movement::new(
                &product_id,
                batch_id.as_deref(),
                line.quantity,
                LedgerReason::SalesReturn,
            )
            .for_order(sale_id);
            entries.push(ledger::credit(&mut tx, &movement).await?);
        }

        tx.commit().await?;

        info!(
            sale_id,
            units = entries.iter().map(|e| e.delta).sum::<i64>(),
            "Sales return recorded"
        );

        Ok(entries)
    }

    /// Voids a committed sale and restores its stock with reversing
    /// entries.
    ///
    /// A sale with returns cannot be voided; its remaining units are
    /// returned instead.
    pub async fn void_sale(&self, sale_id: &str) -> DbResult<Sale> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = 'voided', voided_at = ?2
            WHERE id = ?1
              AND status = 'committed'
              AND NOT EXISTS (
                  SELECT 1 FROM sale_lines WHERE sale_id = ?1 AND returned_quantity > 0
              )
            "#,
        )
        .bind(sale_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let state: Option<(SaleStatus, bool)> = sqlx::query_as(
                r#"
                SELECT status,
                       EXISTS (SELECT 1 FROM sale_lines WHERE sale_id = ?1 AND returned_quantity > 0)
                FROM sales
                WHERE id = ?1
                "#,
            )
            .bind(sale_id)
            .fetch_optional(&mut *tx)
            .await?;

            return Err(match state {
                None => CoreError::SaleNotFound(sale_id.to_string()),
                Some((SaleStatus::Voided, _)) => CoreError::InvalidSaleStatus {
                    sale_id: sale_id.to_string(),
                    current_status: SaleStatus::Voided.to_string(),
                },
                Some((SaleStatus::Committed, _)) => CoreError::InvalidSaleStatus {
                    sale_id: sale_id.to_string(),
                    current_status: "committed with returns".to_string(),
                },
            }
            .into());
        }

        let originals: Vec<StockLedgerEntry> = sqlx::query_as(
            r#"
            SELECT id, product_id, batch_id, delta, reason, reference_order_id,
                   reverses_entry_id, created_at
            FROM stock_ledger
            WHERE reference_order_id = ?1 AND reason = 'sale' AND delta < 0
            ORDER BY created_at, rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *tx)
        .await?;

        for original in &originals {
            let movement = Movement::new(
                &original.product_id,
                original.batch_id.as_deref(),
                -original.delta,
                LedgerReason::Sale,
            )
            .for_order(sale_id)
            .reversing(&original.id);
            ledger::credit(&mut tx, &movement).await?;
        }

        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(sale_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(sale_id, reversed_entries = originals.len(), "Sale voided");

        Ok(sale)
    }
}

/// Generates an invoice number: `INV-YYYYMMDD-XXXXXXXX`.
fn generate_invoice_no(now: chrono::DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("INV-{}-{}", now.format("%Y%m%d"), suffix[..8].to_uppercase())
}

// =============================================================================
// Unit Tests
// =============================================================================
