//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  The old back office summed line totals as JS numbers:                  │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │    1000.00 / 3 = 333.333… (×3 ≠ 1000.00)                                │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (paisa / cents)                     │
//! │    100000 / 3 = 33333 (×3 = 99999)                                     │
//! │    The lost unit is visible and handed to the last installment         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding
//! Every percentage of an amount is rounded **half up** (half away from zero)
//! exactly once. Totals are sums of already-rounded values and are never
//! re-rounded.
//!
//! ## Usage
//! ```rust
//! use medledger_core::money::Money;
//! use medledger_core::types::Rate;
//!
//! let price = Money::from_cents(5000); // 50.00
//! let tax = (price * 2).checked_percentage(Rate::from_bps(500)); // 5% of 100.00
//! assert_eq!(tax, Some(Money::from_cents(500)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::Rate;

/// Basis points in one whole (100%).
pub const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (two decimal places).
///
/// ## Design Decisions
/// - **i64 (signed)**: negative values carry credits, reversals and
///   overpayments (`balance_due < 0`)
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - Currency-agnostic: the store currency is a display concern
///
/// ## Where Money Flows
/// ```text
/// OrderLine.unit_price ──► LineBreakdown.line_total ──► OrderTotals.items_total
///                                                            │
///              TaxStack (CGST/SGST/IGST/VAT) ◄───────────────┘
///                                                            │
///              OrderTotals.grand_total ──► InstallmentLine.amount
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ```rust
    /// use medledger_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    ///
    /// ```rust
    /// use medledger_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(1121, 0).cents(), 112100);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns `rate` percent of this amount, rounded half up once, or
    /// `None` if the result does not fit in i64.
    ///
    /// ## Implementation
    /// Integer math in i128: `round(amount × bps / 10000)`.
    ///
    /// ```rust
    /// use medledger_core::money::Money;
    /// use medledger_core::types::Rate;
    ///
    /// // 950.00 × 9% = 85.50
    /// let cgst = Money::from_cents(95_000).checked_percentage(Rate::from_bps(900));
    /// assert_eq!(cgst, Some(Money::from_cents(8_550)));
    ///
    /// // 10.00 × 8.25% = 0.825 → 0.83
    /// let tax = Money::from_cents(1_000).checked_percentage(Rate::from_bps(825));
    /// assert_eq!(tax, Some(Money::from_cents(83)));
    /// ```
    pub fn checked_percentage(&self, rate: Rate) -> Option<Money> {
        let scaled = i128::from(self.0) * i128::from(rate.bps());
        i64::try_from(div_round_half_up(scaled, BPS_SCALE))
            .ok()
            .map(Money::from_cents)
    }

    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_sub(&self, other: Money) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Sums `amounts`, `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Multiplies money by a quantity, `None` on overflow.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Divides into `parts` equal shares, truncating to the minor unit.
    ///
    /// Returns `(share, residual)` where `share × parts + residual == self`.
    ///
    /// ```rust
    /// use medledger_core::money::Money;
    ///
    /// let (share, residual) = Money::from_cents(100_000).split_floor(3);
    /// assert_eq!(share.cents(), 33_333);
    /// assert_eq!(residual.cents(), 1);
    /// ```
    pub fn split_floor(&self, parts: u32) -> (Money, Money) {
        let parts = i64::from(parts.max(1));
        let share = self.0.div_euclid(parts);
        (Money(share), Money(self.0 - share * parts))
    }
}

/// Integer division rounding half away from zero.
///
/// `denominator` must be positive.
pub(crate) fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the amount with two decimals and no currency symbol; the store
/// currency is applied by the presentation layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
