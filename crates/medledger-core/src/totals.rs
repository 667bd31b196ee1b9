//! # Order Aggregator
//!
//! Turns priced lines into order totals.
//!
//! ## Aggregation
//! ```text
//! lines ──► LineBreakdown[] ──┬── items_total = Σ taxable     (net, pre-GST)
//!                             └── line_tax    = Σ tax_amount  (per-line GST)
//!
//! after_discount = items_total − order_discount     (discount ≤ items_total)
//! order_taxes    = TaxStack(items_total | after_discount)
//! total_tax      = line_tax + Σ order_taxes
//! grand_total    = after_discount + total_tax
//! balance_due    = grand_total − paid               (negative = credit)
//! ```
//!
//! Line amounts are already rounded; nothing here rounds them again. The
//! only new rounding is once per order tax component.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::order::OrderLine;
use crate::pricing::LineBreakdown;
use crate::tax::{TaxBases, TaxLine, TaxStack};
use crate::validation::validate_non_negative;

/// Computed totals for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    /// Per-line breakdowns, in line order.
    pub lines: Vec<LineBreakdown>,
    pub items_total: Money,
    pub order_discount: Money,
    pub after_discount: Money,
    /// GST carried by the lines themselves.
    pub line_tax: Money,
    /// Order-level components (CGST, SGST, IGST, VAT, …).
    pub order_taxes: Vec<TaxLine>,
    pub order_tax_total: Money,
    pub total_tax: Money,
    pub grand_total: Money,
    pub paid: Money,
    pub balance_due: Money,
}

impl OrderTotals {
    /// Whether the customer paid more than owed.
    pub fn is_overpaid(&self) -> bool {
        self.balance_due.is_negative()
    }
}

/// Computes totals for a list of order lines.
///
/// ## Errors
/// - `InvalidLineItem` from any line
/// - `DiscountExceedsTotal` when `order_discount > items_total`
/// - `AmountOverflow` when a sum does not fit in i64 minor units
/// - `Validation` when `order_discount` or `paid` is negative
///
/// ```rust
/// use medledger_core::money::Money;
/// use medledger_core::order::OrderLine;
/// use medledger_core::tax::TaxStack;
/// use medledger_core::totals::compute_order_totals;
/// use medledger_core::types::Rate;
///
/// let lines = vec![OrderLine::new("p", 2, Money::from_cents(5_000)).with_gst(Rate::from_bps(500))];
/// let totals = compute_order_totals(&lines, Money::zero(), &TaxStack::default(), Money::zero()).unwrap();
/// assert_eq!(totals.grand_total.cents(), 10_500);
/// ```
pub fn compute_order_totals(
    lines: &[OrderLine],
    order_discount: Money,
    taxes: &TaxStack,
    paid: Money,
) -> CoreResult<OrderTotals> {
    let breakdowns = lines
        .iter()
        .map(OrderLine::breakdown)
        .collect::<CoreResult<Vec<_>>>()?;
    totals_from_breakdowns(breakdowns, order_discount, taxes, paid)
}

/// Aggregates lines that were already priced.
pub fn totals_from_breakdowns(
    lines: Vec<LineBreakdown>,
    order_discount: Money,
    taxes: &TaxStack,
    paid: Money,
) -> CoreResult<OrderTotals> {
    validate_non_negative("order_discount", order_discount)?;
    validate_non_negative("paid_amount", paid)?;

    let items_total = Money::checked_sum(lines.iter().map(|l| l.taxable))
        .ok_or_else(|| CoreError::overflow("items total"))?;
    let line_tax = Money::checked_sum(lines.iter().map(|l| l.tax_amount))
        .ok_or_else(|| CoreError::overflow("line tax"))?;

    if order_discount > items_total {
        return Err(CoreError::DiscountExceedsTotal {
            discount: order_discount,
            items_total,
        });
    }
    let after_discount = items_total - order_discount;

    let stack = taxes.apply(TaxBases {
        items_total,
        after_discount,
    })?;
    let total_tax = line_tax
        .checked_add(stack.total)
        .ok_or_else(|| CoreError::overflow("total tax"))?;
    let grand_total = after_discount
        .checked_add(total_tax)
        .ok_or_else(|| CoreError::overflow("grand total"))?;
    let balance_due = grand_total
        .checked_sub(paid)
        .ok_or_else(|| CoreError::overflow("balance due"))?;

    Ok(OrderTotals {
        lines,
        items_total,
        order_discount,
        after_discount,
        line_tax,
        order_taxes: stack.lines,
        order_tax_total: stack.total,
        total_tax,
        grand_total,
        paid,
        balance_due,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::{TaxBase, TaxComponent};
    use crate::types::Rate;

    fn cents(v: i64) -> Money {
        Money::from_cents(v)
    }

    fn gst_split() -> TaxStack {
        TaxStack::new(vec![
            TaxComponent::cgst(Rate::from_bps(900)),
            TaxComponent::sgst(Rate::from_bps(900)),
        ])
    }

    #[test]
    fn test_sale_with_line_gst() {
        let lines = vec![OrderLine::new("p", 2, cents(5_000)).with_gst(Rate::from_bps(500))];
        let totals = compute_order_totals(&lines, Money::zero(), &TaxStack::default(), Money::zero()).unwrap();

        assert_eq!(totals.items_total.cents(), 10_000);
        assert_eq!(totals.total_tax.cents(), 500);
        assert_eq!(totals.grand_total.cents(), 10_500);
        assert_eq!(totals.balance_due.cents(), 10_500);
    }

    #[test]
    fn test_purchase_with_cgst_sgst() {
        let lines = vec![
            OrderLine::new("a", 4, cents(15_000)),
            OrderLine::new("b", 8, cents(5_000)),
        ];
        let totals = compute_order_totals(&lines, cents(5_000), &gst_split(), Money::zero()).unwrap();

        assert_eq!(totals.items_total.cents(), 100_000);
        assert_eq!(totals.after_discount.cents(), 95_000);
        assert_eq!(totals.order_taxes.len(), 2);
        assert_eq!(totals.total_tax.cents(), 17_100);
        assert_eq!(totals.grand_total.cents(), 112_100);
    }

    #[test]
    fn test_component_on_items_total() {
        let lines = vec![OrderLine::new("a", 1, cents(100_000))];
        let taxes = TaxStack::from_raw([("VAT", 1_000, TaxBase::ItemsTotal)]).unwrap();
        let totals = compute_order_totals(&lines, cents(10_000), &taxes, Money::zero()).unwrap();

        // VAT ignores the order discount
        assert_eq!(totals.order_tax_total.cents(), 10_000);
        assert_eq!(totals.grand_total.cents(), 100_000);
    }

    #[test]
    fn test_line_and_order_taxes_add_up() {
        let lines = vec![OrderLine::new("a", 10, cents(1_200))
            .with_discount(Rate::from_bps(1_000))
            .with_gst(Rate::from_bps(1_200))];
        let totals = compute_order_totals(&lines, Money::zero(), &gst_split(), Money::zero()).unwrap();

        assert_eq!(totals.items_total.cents(), 10_800);
        assert_eq!(totals.line_tax.cents(), 1_296);
        assert_eq!(totals.order_tax_total.cents(), 972 * 2);
        assert_eq!(totals.total_tax, totals.line_tax + totals.order_tax_total);
        assert_eq!(
            totals.items_total + totals.line_tax,
            totals.lines.iter().map(|l| l.line_total).sum::<Money>()
        );
    }

    #[test]
    fn test_discount_cannot_exceed_items_total() {
        let lines = vec![OrderLine::new("a", 1, cents(10_000))];
        let err = compute_order_totals(&lines, cents(15_000), &TaxStack::default(), Money::zero()).unwrap_err();
        assert!(matches!(err, CoreError::DiscountExceedsTotal { .. }));

        let totals = compute_order_totals(&lines, cents(10_000), &TaxStack::default(), Money::zero()).unwrap();
        assert!(totals.after_discount.is_zero());
        assert!(totals.grand_total.is_zero());
    }

    #[test]
    fn test_overpayment_is_a_credit() {
        let lines = vec![OrderLine::new("a", 1, cents(10_000))];
        let totals = compute_order_totals(&lines, Money::zero(), &TaxStack::default(), cents(12_000)).unwrap();
        assert_eq!(totals.balance_due.cents(), -2_000);
        assert!(totals.is_overpaid());
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let lines = vec![OrderLine::new("a", 1, cents(10_000))];
        assert!(matches!(
            compute_order_totals(&lines, cents(-1), &TaxStack::default(), Money::zero()),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            compute_order_totals(&lines, Money::zero(), &TaxStack::default(), cents(-1)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_line_surfaces() {
        let lines = vec![OrderLine::new("a", 0, cents(10_000))];
        assert!(matches!(
            compute_order_totals(&lines, Money::zero(), &TaxStack::default(), Money::zero()),
            Err(CoreError::InvalidLineItem { .. })
        ));
    }

    #[test]
    fn test_large_orders_overflow_cleanly() {
        // each line fits on its own, their sum does not
        let lines = vec![
            OrderLine::new("a", 100_000, cents(60_000_000_000_000)),
            OrderLine::new("b", 100_000, cents(60_000_000_000_000)),
        ];
        assert!(matches!(
            compute_order_totals(&lines, Money::zero(), &TaxStack::default(), Money::zero()),
            Err(CoreError::AmountOverflow { .. })
        ));

        let single = &lines[..1];
        let taxes = TaxStack::from_raw([("VAT", 20_000, TaxBase::ItemsTotal)]).unwrap();
        assert!(matches!(
            compute_order_totals(single, Money::zero(), &taxes, Money::zero()),
            Err(CoreError::AmountOverflow { .. })
        ));
    }

    #[test]
    fn test_recomputation_is_stable() {
        let lines = vec![
            OrderLine::new("a", 3, cents(1_999)).with_gst(Rate::from_bps(1_200)),
            OrderLine::new("b", 7, cents(333)).with_discount(Rate::from_bps(250)),
        ];
        let first = compute_order_totals(&lines, cents(500), &gst_split(), cents(1_000)).unwrap();
        let second = compute_order_totals(&lines, cents(500), &gst_split(), cents(1_000)).unwrap();
        assert_eq!(first, second);
    }
}
