//! # Line Item Calculator
//!
//! Computes one order line's amounts from quantity, unit price, discount
//! and GST/VAT.
//!
//! ## Fixed Order of Operations
//! ```text
//! subtotal        = quantity × unit_price
//! taxable         = subtotal × (1 − discount%)     (rounded half up)
//! discount_amount = subtotal − taxable
//! tax_amount      = line_total − taxable
//! line_total      = subtotal × (1 − discount%) × (1 + gst%)   (rounded ONCE)
//! ```
//!
//! `line_total` is evaluated exactly in i128 and rounded a single time, so
//! `taxable + tax_amount == line_total` always holds and nothing is
//! re-rounded later during aggregation.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{div_round_half_up, Money, BPS_SCALE};
use crate::types::Rate;

/// Full breakdown of a priced line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineBreakdown {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub taxable: Money,
    pub tax_amount: Money,
    pub line_total: Money,
}

/// Prices a single line.
///
/// ## Errors
/// `InvalidLineItem` when `quantity ≤ 0`, `unit_price < 0`, the discount
/// exceeds 100%, or the amounts overflow.
///
/// ```rust
/// use medledger_core::money::Money;
/// use medledger_core::pricing::compute_line;
/// use medledger_core::types::Rate;
///
/// let line = compute_line(2, Money::from_cents(5_000), Rate::zero(), Rate::from_bps(500)).unwrap();
/// assert_eq!(line.taxable.cents(), 10_000);
/// assert_eq!(line.tax_amount.cents(), 500);
/// assert_eq!(line.line_total.cents(), 10_500);
/// ```
pub fn compute_line(
    quantity: i64,
    unit_price: Money,
    discount: Rate,
    gst: Rate,
) -> CoreResult<LineBreakdown> {
    if quantity <= 0 {
        return Err(CoreError::invalid_line(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if unit_price.is_negative() {
        return Err(CoreError::invalid_line(format!(
            "unit price must not be negative, got {unit_price}"
        )));
    }
    if i128::from(discount.bps()) > BPS_SCALE {
        return Err(CoreError::invalid_line(format!(
            "discount must be between 0% and 100%, got {}%",
            discount.percentage()
        )));
    }

    let subtotal = unit_price
        .checked_multiply_quantity(quantity)
        .ok_or_else(|| CoreError::invalid_line("line subtotal overflows"))?;

    // Rounding the net keeps tax_amount at zero when gst is zero.
    let net = i128::from(subtotal.cents()) * (BPS_SCALE - i128::from(discount.bps()));
    let taxable = Money::from_cents(div_round_half_up(net, BPS_SCALE) as i64);
    let discount_amount = subtotal - taxable;

    // subtotal × (10000 − d) × (10000 + g) / 10000²
    let exact = i128::from(subtotal.cents())
        * (BPS_SCALE - i128::from(discount.bps()))
        * (BPS_SCALE + i128::from(gst.bps()));
    let line_total = i64::try_from(div_round_half_up(exact, BPS_SCALE * BPS_SCALE))
        .map(Money::from_cents)
        .map_err(|_| CoreError::invalid_line("line total overflows"))?;

    Ok(LineBreakdown {
        subtotal,
        discount_amount,
        taxable,
        tax_amount: line_total - taxable,
        line_total,
    })
}

/// Prices a line and returns only its total.
pub fn compute_line_total(
    quantity: i64,
    unit_price: Money,
    discount: Rate,
    gst: Rate,
) -> CoreResult<Money> {
    compute_line(quantity, unit_price, discount, gst).map(|b| b.line_total)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn price(cents: i64) -> Money {
        Money::from_cents(cents)
    }

    #[test]
    fn test_plain_line() {
        let line = compute_line(3, price(299), Rate::zero(), Rate::zero()).unwrap();
        assert_eq!(line.subtotal.cents(), 897);
        assert!(line.discount_amount.is_zero());
        assert!(line.tax_amount.is_zero());
        assert_eq!(line.line_total.cents(), 897);
    }

    #[test]
    fn test_discount_before_gst() {
        // 10 × 12.00 = 120.00, 10% off = 108.00, 12% GST = 12.96
        let line = compute_line(10, price(1_200), Rate::from_bps(1_000), Rate::from_bps(1_200)).unwrap();
        assert_eq!(line.discount_amount.cents(), 1_200);
        assert_eq!(line.taxable.cents(), 10_800);
        assert_eq!(line.tax_amount.cents(), 1_296);
        assert_eq!(line.line_total.cents(), 12_096);
    }

    #[test]
    fn test_single_rounding_per_line() {
        // 1 × 0.99 at 7.5% off and 5% GST:
        // exact total = 0.99 × 0.925 × 1.05 = 0.9615375 → 0.96
        let line = compute_line(1, price(99), Rate::from_bps(750), Rate::from_bps(500)).unwrap();
        assert_eq!(line.line_total.cents(), 96);
        assert_eq!(line.taxable + line.tax_amount, line.line_total);
    }

    #[test]
    fn test_full_discount_is_free() {
        let line = compute_line(4, price(2_500), Rate::from_bps(10_000), Rate::from_bps(1_800)).unwrap();
        assert!(line.line_total.is_zero());
    }

    #[test]
    fn test_free_item_allowed() {
        let total = compute_line_total(1, Money::zero(), Rate::zero(), Rate::from_bps(500)).unwrap();
        assert!(total.is_zero());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            compute_line(0, price(100), Rate::zero(), Rate::zero()),
            Err(CoreError::InvalidLineItem { .. })
        ));
        assert!(matches!(
            compute_line(-2, price(100), Rate::zero(), Rate::zero()),
            Err(CoreError::InvalidLineItem { .. })
        ));
        assert!(matches!(
            compute_line(1, price(-1), Rate::zero(), Rate::zero()),
            Err(CoreError::InvalidLineItem { .. })
        ));
        assert!(matches!(
            compute_line(1, price(100), Rate::from_bps(10_001), Rate::zero()),
            Err(CoreError::InvalidLineItem { .. })
        ));
        assert!(matches!(
            compute_line(i64::MAX, price(100), Rate::zero(), Rate::zero()),
            Err(CoreError::InvalidLineItem { .. })
        ));
    }

    #[test]
    fn test_deterministic_and_non_negative() {
        for qty in [1, 7, 250] {
            for cents in [0, 1, 99, 12_345] {
                for disc in [0, 333, 5_000, 10_000] {
                    for gst in [0, 500, 1_200, 2_800] {
                        let a = compute_line(qty, price(cents), Rate::from_bps(disc), Rate::from_bps(gst)).unwrap();
                        let b = compute_line(qty, price(cents), Rate::from_bps(disc), Rate::from_bps(gst)).unwrap();
                        assert_eq!(a, b);
                        assert!(!a.line_total.is_negative());
                        assert!(!a.tax_amount.is_negative());
                    }
                }
            }
        }
    }
}
