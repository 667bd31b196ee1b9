//! # Draft Order
//!
//! The in-memory order a terminal builds before committing it.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Draft Order Operations                             │
//! │                                                                         │
//! │  Terminal Action          DraftOrder call          Effect               │
//! │  ───────────────          ───────────────          ──────               │
//! │                                                                         │
//! │  Scan product ──────────► add_line() ────────────► lines.push / qty += │
//! │  Change quantity ───────► set_quantity() ────────► lines[i].qty = n    │
//! │  Remove ────────────────► remove_line() ─────────► lines.remove(i)     │
//! │  Discount / taxes ──────► set_order_discount() ──► order_discount      │
//! │  Tender ────────────────► set_paid() ────────────► paid                │
//! │  EMI toggle ────────────► enable_emi() ──────────► emi_months          │
//! │                                                                         │
//! │  View totals ───────────► totals() ──────────────► (pure, no I/O)      │
//! │                                                                         │
//! │  Commit ────────────────► medledger-db (one transaction)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A draft is only a value. Nothing is persisted until the database layer
//! commits it, so the UI can never diverge from stored state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::installment::{schedule_installments, validate_term, InstallmentLine};
use crate::money::Money;
use crate::pricing::{compute_line, LineBreakdown};
use crate::tax::TaxStack;
use crate::totals::{compute_order_totals, OrderTotals};
use crate::types::{OrderKind, Product, Rate};
use crate::validation::{validate_batch_no, validate_non_negative, validate_quantity};
use crate::{MAX_LINE_QUANTITY, MAX_ORDER_LINES};

// =============================================================================
// Order Line
// =============================================================================

/// Which batch a line moves stock in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchRef {
    /// A batch already on the shelf (sales, supplier returns).
    Existing { batch_id: String },
    /// A batch arriving with a purchase; created by the GRN if new.
    Incoming {
        batch_no: String,
        #[ts(as = "Option<String>")]
        expiry_date: Option<NaiveDate>,
    },
}

/// One line of a draft order with its price inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    pub product_id: String,
    pub batch: Option<BatchRef>,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Rate,
    pub gst: Rate,
}

impl OrderLine {
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        OrderLine {
            product_id: product_id.into(),
            batch: None,
            quantity,
            unit_price,
            discount: Rate::zero(),
            gst: Rate::zero(),
        }
    }

    /// Creates a sale line priced from the catalog.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        OrderLine {
            product_id: product.id.clone(),
            batch: None,
            quantity,
            unit_price: product.unit_price(),
            discount: Rate::zero(),
            gst: product.gst_rate(),
        }
    }

    pub fn with_discount(mut self, discount: Rate) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_gst(mut self, gst: Rate) -> Self {
        self.gst = gst;
        self
    }

    pub fn from_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch = Some(BatchRef::Existing {
            batch_id: batch_id.into(),
        });
        self
    }

    pub fn into_batch(mut self, batch_no: impl Into<String>, expiry_date: Option<NaiveDate>) -> Self {
        self.batch = Some(BatchRef::Incoming {
            batch_no: batch_no.into(),
            expiry_date,
        });
        self
    }

    /// The existing batch id, if the line names one.
    pub fn batch_id(&self) -> Option<&str> {
        match &self.batch {
            Some(BatchRef::Existing { batch_id }) => Some(batch_id),
            _ => None,
        }
    }

    /// Prices the line.
    pub fn breakdown(&self) -> CoreResult<LineBreakdown> {
        compute_line(self.quantity, self.unit_price, self.discount, self.gst)
    }

    /// Lines merge when they move the same product in the same batch at the
    /// same price.
    fn merges_with(&self, other: &OrderLine) -> bool {
        self.product_id == other.product_id
            && self.batch == other.batch
            && self.unit_price == other.unit_price
            && self.discount == other.discount
            && self.gst == other.gst
    }
}

// =============================================================================
// Draft Order
// =============================================================================

/// A sale or purchase being assembled.
///
/// ## Invariants
/// - At most `MAX_ORDER_LINES` lines
/// - Every line quantity is in `1..=MAX_LINE_QUANTITY`
/// - `order_discount` and `paid` are never negative
/// - `emi_months` is only set on sales and only to a supported term
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DraftOrder {
    pub kind: OrderKind,
    /// Customer or supplier name.
    pub counterparty: Option<String>,
    pub invoice_no: Option<String>,
    lines: Vec<OrderLine>,
    order_discount: Money,
    #[ts(skip)]
    taxes: TaxStack,
    paid: Money,
    emi_months: Option<u32>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl DraftOrder {
    pub fn new(kind: OrderKind) -> Self {
        DraftOrder {
            kind,
            counterparty: None,
            invoice_no: None,
            lines: Vec::new(),
            order_discount: Money::zero(),
            taxes: TaxStack::default(),
            paid: Money::zero(),
            emi_months: None,
            created_at: Utc::now(),
        }
    }

    pub fn sale() -> Self {
        DraftOrder::new(OrderKind::Sale)
    }

    pub fn purchase() -> Self {
        DraftOrder::new(OrderKind::Purchase)
    }

    pub fn with_counterparty(mut self, name: impl Into<String>) -> Self {
        self.counterparty = Some(name.into());
        self
    }

    pub fn with_invoice_no(mut self, invoice_no: impl Into<String>) -> Self {
        self.invoice_no = Some(invoice_no.into());
        self
    }

    /// Adds a line, or increases the quantity of an identical one.
    ///
    /// The line is priced once here so an invalid quantity, price or
    /// discount is rejected as `InvalidLineItem` before it reaches the draft.
    pub fn add_line(&mut self, line: OrderLine) -> CoreResult<()> {
        self.check_line(&line)?;

        if let Some(existing) = self.lines.iter_mut().find(|l| l.merges_with(&line)) {
            let new_qty = existing.quantity + line.quantity;
            if new_qty > MAX_LINE_QUANTITY {
                return Err(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max: MAX_LINE_QUANTITY,
                }
                .into());
            }
            existing.quantity = new_qty;
            return Ok(());
        }

        if self.lines.len() >= MAX_ORDER_LINES {
            return Err(CoreError::OrderTooLarge {
                max: MAX_ORDER_LINES,
            });
        }

        self.lines.push(line);
        Ok(())
    }

    /// Sets the quantity of the line at `index`; zero removes it.
    pub fn set_quantity(&mut self, index: usize, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_line(index).map(|_| ());
        }
        validate_quantity(quantity)?;

        let line = self
            .lines
            .get_mut(index)
            .ok_or_else(|| CoreError::invalid_line(format!("no line at position {index}")))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove_line(&mut self, index: usize) -> CoreResult<OrderLine> {
        if index >= self.lines.len() {
            return Err(CoreError::invalid_line(format!("no line at position {index}")));
        }
        Ok(self.lines.remove(index))
    }

    pub fn set_order_discount(&mut self, discount: Money) -> CoreResult<()> {
        validate_non_negative("order_discount", discount)?;
        self.order_discount = discount;
        Ok(())
    }

    pub fn set_taxes(&mut self, taxes: TaxStack) {
        self.taxes = taxes;
    }

    pub fn set_paid(&mut self, paid: Money) -> CoreResult<()> {
        validate_non_negative("paid_amount", paid)?;
        self.paid = paid;
        Ok(())
    }

    /// Turns on flat EMI for a sale.
    pub fn enable_emi(&mut self, months: u32) -> CoreResult<()> {
        if self.kind != OrderKind::Sale {
            return Err(ValidationError::InvalidFormat {
                field: "emi_months".to_string(),
                reason: "only sales can be paid in installments".to_string(),
            }
            .into());
        }
        validate_term(months)?;
        self.emi_months = Some(months);
        Ok(())
    }

    pub fn disable_emi(&mut self) {
        self.emi_months = None;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.order_discount = Money::zero();
        self.paid = Money::zero();
        self.emi_months = None;
        self.created_at = Utc::now();
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn order_discount(&self) -> Money {
        self.order_discount
    }

    pub fn taxes(&self) -> &TaxStack {
        &self.taxes
    }

    pub fn paid(&self) -> Money {
        self.paid
    }

    pub fn emi_months(&self) -> Option<u32> {
        self.emi_months
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Computes the order totals. Pure; calling it twice gives the same
    /// result.
    pub fn totals(&self) -> CoreResult<OrderTotals> {
        compute_order_totals(&self.lines, self.order_discount, &self.taxes, self.paid)
    }

    /// The EMI schedule for this draft, if EMI is enabled.
    pub fn installments(&self, sale_date: NaiveDate) -> CoreResult<Option<Vec<InstallmentLine>>> {
        match self.emi_months {
            Some(months) => {
                let totals = self.totals()?;
                schedule_installments(totals.grand_total, months, sale_date).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Checks everything that can be checked without the database.
    ///
    /// A deserialized draft never went through `add_line`, so every line
    /// rule is checked again here.
    pub fn validate_for_commit(&self) -> CoreResult<()> {
        if self.lines.is_empty() {
            return Err(CoreError::EmptyOrder);
        }
        if self.lines.len() > MAX_ORDER_LINES {
            return Err(CoreError::OrderTooLarge {
                max: MAX_ORDER_LINES,
            });
        }
        for line in &self.lines {
            self.check_line(line)?;
        }
        validate_non_negative("order_discount", self.order_discount)?;
        validate_non_negative("paid_amount", self.paid)?;
        if let Some(months) = self.emi_months {
            validate_term(months)?;
        }
        self.totals().map(|_| ())
    }

    fn check_line(&self, line: &OrderLine) -> CoreResult<()> {
        line.breakdown()?;
        validate_quantity(line.quantity)?;
        self.check_batch_ref(line)
    }

    fn check_batch_ref(&self, line: &OrderLine) -> CoreResult<()> {
        match (&self.kind, &line.batch) {
            (OrderKind::Sale, Some(BatchRef::Incoming { .. })) => Err(CoreError::invalid_line(
                "sale lines must draw from an existing batch",
            )),
            (OrderKind::Purchase, Some(BatchRef::Existing { .. })) => Err(CoreError::invalid_line(
                "purchase lines must describe the incoming batch",
            )),
            (_, Some(BatchRef::Incoming { batch_no, .. })) => {
                validate_batch_no(batch_no)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::TaxComponent;

    fn paracetamol() -> Product {
        Product {
            id: "prod-1".to_string(),
            sku: "PCM-500".to_string(),
            name: "Paracetamol 500mg".to_string(),
            unit_cost_cents: 3_000,
            unit_price_cents: 5_000,
            gst_rate_bps: 500,
            reorder_level: 10,
            batch_tracked: true,
            stock_quantity: 40,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_line_from_product() {
        let mut order = DraftOrder::sale();
        order
            .add_line(OrderLine::from_product(&paracetamol(), 2).from_batch("batch-1"))
            .unwrap();

        let totals = order.totals().unwrap();
        assert_eq!(totals.items_total.cents(), 10_000);
        assert_eq!(totals.total_tax.cents(), 500);
        assert_eq!(totals.grand_total.cents(), 10_500);
    }

    #[test]
    fn test_same_line_merges_quantity() {
        let mut order = DraftOrder::sale();
        let line = OrderLine::from_product(&paracetamol(), 2).from_batch("batch-1");
        order.add_line(line.clone()).unwrap();
        order.add_line(line).unwrap();

        assert_eq!(order.line_count(), 1);
        assert_eq!(order.total_quantity(), 4);
    }

    #[test]
    fn test_different_batches_stay_separate() {
        let mut order = DraftOrder::sale();
        order
            .add_line(OrderLine::from_product(&paracetamol(), 2).from_batch("batch-1"))
            .unwrap();
        order
            .add_line(OrderLine::from_product(&paracetamol(), 1).from_batch("batch-2"))
            .unwrap();
        assert_eq!(order.line_count(), 2);
    }

    #[test]
    fn test_rejects_invalid_lines() {
        let mut order = DraftOrder::sale();
        for line in [
            OrderLine::new("p", 0, Money::from_cents(100)),
            OrderLine::new("p", -3, Money::from_cents(100)),
            OrderLine::new("p", 1, Money::from_cents(-1)),
            OrderLine::new("p", 1, Money::from_cents(100)).with_discount(Rate::from_bps(12_000)),
        ] {
            assert!(matches!(
                order.add_line(line),
                Err(CoreError::InvalidLineItem { .. })
            ));
        }
        assert!(order.is_empty());
    }

    #[test]
    fn test_sale_cannot_name_incoming_batch() {
        let mut order = DraftOrder::sale();
        let err = order
            .add_line(OrderLine::new("p", 1, Money::from_cents(100)).into_batch("B-1", None))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidLineItem { .. }));

        let mut purchase = DraftOrder::purchase();
        assert!(purchase
            .add_line(OrderLine::new("p", 1, Money::from_cents(100)).from_batch("batch-1"))
            .is_err());
        assert!(purchase
            .add_line(OrderLine::new("p", 1, Money::from_cents(100)).into_batch("B-1", None))
            .is_ok());
    }

    #[test]
    fn test_merge_respects_max_quantity() {
        let mut order = DraftOrder::purchase();
        let line = OrderLine::new("p", MAX_LINE_QUANTITY, Money::from_cents(1)).into_batch("B-1", None);
        order.add_line(line.clone()).unwrap();
        assert!(order.add_line(line.with_gst(Rate::zero())).is_err());
        assert_eq!(order.total_quantity(), MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_order_line_limit() {
        let mut order = DraftOrder::purchase();
        for i in 0..MAX_ORDER_LINES {
            order
                .add_line(OrderLine::new(format!("p-{i}"), 1, Money::from_cents(100)))
                .unwrap();
        }
        assert!(matches!(
            order.add_line(OrderLine::new("one-more", 1, Money::from_cents(100))),
            Err(CoreError::OrderTooLarge { .. })
        ));
    }

    #[test]
    fn test_set_quantity_and_remove() {
        let mut order = DraftOrder::sale();
        order.add_line(OrderLine::new("a", 1, Money::from_cents(100))).unwrap();
        order.add_line(OrderLine::new("b", 1, Money::from_cents(200))).unwrap();

        order.set_quantity(1, 5).unwrap();
        assert_eq!(order.lines()[1].quantity, 5);

        order.set_quantity(0, 0).unwrap();
        assert_eq!(order.line_count(), 1);
        assert_eq!(order.lines()[0].product_id, "b");

        assert!(order.set_quantity(3, 1).is_err());
        assert!(order.remove_line(7).is_err());
    }

    #[test]
    fn test_multi_tax_purchase_totals() {
        let mut order = DraftOrder::purchase().with_counterparty("Acme Pharma");
        order
            .add_line(OrderLine::new("p", 10, Money::from_cents(10_000)).into_batch("B-77", None))
            .unwrap();
        order.set_order_discount(Money::from_cents(5_000)).unwrap();
        order.set_taxes(TaxStack::new(vec![
            TaxComponent::cgst(Rate::from_bps(900)),
            TaxComponent::sgst(Rate::from_bps(900)),
        ]));

        let totals = order.totals().unwrap();
        assert_eq!(totals.after_discount.cents(), 95_000);
        assert_eq!(totals.total_tax.cents(), 17_100);
        assert_eq!(totals.grand_total.cents(), 112_100);
    }

    #[test]
    fn test_negative_discount_and_paid_rejected() {
        let mut order = DraftOrder::sale();
        assert!(order.set_order_discount(Money::from_cents(-1)).is_err());
        assert!(order.set_paid(Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_emi_only_for_sales() {
        let mut purchase = DraftOrder::purchase();
        assert!(purchase.enable_emi(3).is_err());

        let mut sale = DraftOrder::sale();
        assert!(matches!(
            sale.enable_emi(5),
            Err(CoreError::InvalidInstallmentTerm { months: 5 })
        ));
        sale.enable_emi(3).unwrap();
        assert_eq!(sale.emi_months(), Some(3));
    }

    #[test]
    fn test_installments_follow_grand_total() {
        let mut sale = DraftOrder::sale();
        sale.add_line(OrderLine::new("p", 1, Money::from_cents(100_000))).unwrap();
        sale.enable_emi(3).unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let plan = sale.installments(date).unwrap().unwrap();
        let amounts: Vec<i64> = plan.iter().map(|l| l.amount.cents()).collect();
        assert_eq!(amounts, vec![33_333, 33_333, 33_334]);

        sale.disable_emi();
        assert!(sale.installments(date).unwrap().is_none());
    }

    #[test]
    fn test_batch_ref_wire_shape() {
        let existing = serde_json::to_value(BatchRef::Existing {
            batch_id: "batch-1".to_string(),
        })
        .unwrap();
        assert_eq!(existing["kind"], "existing");
        assert_eq!(existing["batch_id"], "batch-1");

        let incoming: BatchRef = serde_json::from_str(
            r#"{"kind":"incoming","batch_no":"B-9","expiry_date":"2027-06-30"}"#,
        )
        .unwrap();
        assert_eq!(
            incoming,
            BatchRef::Incoming {
                batch_no: "B-9".to_string(),
                expiry_date: NaiveDate::from_ymd_opt(2027, 6, 30),
            }
        );
    }

    #[test]
    fn test_empty_order_cannot_commit() {
        assert!(matches!(
            DraftOrder::sale().validate_for_commit(),
            Err(CoreError::EmptyOrder)
        ));
    }

    #[test]
    fn test_discount_over_items_blocks_commit() {
        let mut sale = DraftOrder::sale();
        sale.add_line(OrderLine::new("p", 1, Money::from_cents(1_000))).unwrap();
        sale.set_order_discount(Money::from_cents(1_001)).unwrap();
        assert!(matches!(
            sale.validate_for_commit(),
            Err(CoreError::DiscountExceedsTotal { .. })
        ));
    }

    #[test]
    fn test_deserialized_draft_is_rechecked() {
        let mut sale = DraftOrder::sale();
        sale.add_line(OrderLine::new("p", 1, Money::from_cents(1_000))).unwrap();
        sale.validate_for_commit().unwrap();

        let mut wire = serde_json::to_value(&sale).unwrap();
        wire["lines"][0]["quantity"] = serde_json::json!(MAX_LINE_QUANTITY + 1);
        let oversized: DraftOrder = serde_json::from_value(wire.clone()).unwrap();
        assert!(matches!(
            oversized.validate_for_commit(),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        wire["lines"][0]["quantity"] = serde_json::json!(0);
        let zero: DraftOrder = serde_json::from_value(wire).unwrap();
        assert!(matches!(
            zero.validate_for_commit(),
            Err(CoreError::InvalidLineItem { .. })
        ));
    }
}
