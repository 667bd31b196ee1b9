//! # Tax Stack
//!
//! Applies an ordered set of percentage components (CGST, SGST, IGST, VAT, …)
//! to an order.
//!
//! ## Stacking Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ADDITIVE, NEVER COMPOUNDED                                            │
//! │                                                                         │
//! │  after_discount = 950.00                                               │
//! │      ├── CGST 9% on AfterDiscount ─► 85.50                             │
//! │      └── SGST 9% on AfterDiscount ─► 85.50                             │
//! │                                      ──────                            │
//! │                              total ─► 171.00                           │
//! │                                                                         │
//! │  Each component sees the *same* base it was configured with; no        │
//! │  component ever taxes another component's output.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The base a component applies to is fixed when the component is defined
//! (usually in configuration), never inferred per order.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::Rate;

/// Which subtotal a component taxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxBase {
    /// The raw items total, before the order-level discount.
    ItemsTotal,
    /// The items total net of the order-level discount.
    #[default]
    AfterDiscount,
}

impl TaxBase {
    /// The stored text form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaxBase::ItemsTotal => "items_total",
            TaxBase::AfterDiscount => "after_discount",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "items_total" => Some(TaxBase::ItemsTotal),
            "after_discount" => Some(TaxBase::AfterDiscount),
            _ => None,
        }
    }
}

/// A named, independently configured tax component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxComponent {
    pub name: String,
    pub rate: Rate,
    pub base: TaxBase,
}

impl TaxComponent {
    /// Creates a component from untrusted input.
    ///
    /// ```rust
    /// use medledger_core::tax::{TaxBase, TaxComponent};
    ///
    /// let cgst = TaxComponent::new("CGST", 900, TaxBase::AfterDiscount).unwrap();
    /// assert_eq!(cgst.rate.bps(), 900);
    /// assert!(TaxComponent::new("VAT", -100, TaxBase::ItemsTotal).is_err());
    /// ```
    pub fn new(name: impl Into<String>, rate_bps: i64, base: TaxBase) -> CoreResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "tax component name".to_string(),
            }
            .into());
        }
        let rate = Rate::try_from_bps(rate_bps)?;
        Ok(TaxComponent { name, rate, base })
    }

    /// Shorthand for the common Indian GST split on the post-discount base.
    pub fn cgst(rate: Rate) -> Self {
        TaxComponent {
            name: "CGST".to_string(),
            rate,
            base: TaxBase::AfterDiscount,
        }
    }

    pub fn sgst(rate: Rate) -> Self {
        TaxComponent {
            name: "SGST".to_string(),
            rate,
            base: TaxBase::AfterDiscount,
        }
    }
}

/// The two candidate bases for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxBases {
    pub items_total: Money,
    pub after_discount: Money,
}

impl TaxBases {
    /// Selects the base for a component.
    pub fn select(&self, base: TaxBase) -> Money {
        match base {
            TaxBase::ItemsTotal => self.items_total,
            TaxBase::AfterDiscount => self.after_discount,
        }
    }
}

/// One evaluated component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxLine {
    pub name: String,
    pub rate: Rate,
    pub base: TaxBase,
    /// The amount the rate was applied to.
    pub taxable: Money,
    pub amount: Money,
}

/// Result of applying a stack: one line per component plus the sum.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxStackResult {
    pub lines: Vec<TaxLine>,
    pub total: Money,
}

/// An ordered list of components applied additively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxStack {
    components: Vec<TaxComponent>,
}

impl TaxStack {
    pub fn new(components: Vec<TaxComponent>) -> Self {
        TaxStack { components }
    }

    /// Builds a stack from raw `(name, bps, base)` triples, rejecting any
    /// negative rate with `InvalidTaxRate`.
    pub fn from_raw<'a, I>(raw: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (&'a str, i64, TaxBase)>,
    {
        let components = raw
            .into_iter()
            .map(|(name, bps, base)| TaxComponent::new(name, bps, base))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(TaxStack { components })
    }

    pub fn components(&self) -> &[TaxComponent] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Applies every component to its configured base.
    ///
    /// Each component amount is rounded half up once; the total is the sum
    /// of the rounded amounts. `AmountOverflow` if an amount or the total
    /// does not fit.
    pub fn apply(&self, bases: TaxBases) -> CoreResult<TaxStackResult> {
        let lines = self
            .components
            .iter()
            .map(|c| {
                let taxable = bases.select(c.base);
                let amount = taxable
                    .checked_percentage(c.rate)
                    .ok_or_else(|| CoreError::overflow(format!("{} amount", c.name)))?;
                Ok(TaxLine {
                    name: c.name.clone(),
                    rate: c.rate,
                    base: c.base,
                    taxable,
                    amount,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        let total = Money::checked_sum(lines.iter().map(|l| l.amount))
            .ok_or_else(|| CoreError::overflow("order tax total"))?;
        Ok(TaxStackResult { lines, total })
    }
}

impl From<Vec<TaxComponent>> for TaxStack {
    fn from(components: Vec<TaxComponent>) -> Self {
        TaxStack::new(components)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bases(items: i64, after: i64) -> TaxBases {
        TaxBases {
            items_total: Money::from_cents(items),
            after_discount: Money::from_cents(after),
        }
    }

    #[test]
    fn test_cgst_sgst_on_post_discount_base() {
        let stack = TaxStack::new(vec![
            TaxComponent::cgst(Rate::from_bps(900)),
            TaxComponent::sgst(Rate::from_bps(900)),
        ]);
        let result = stack.apply(bases(100_000, 95_000)).unwrap();

        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.lines[0].amount.cents(), 8_550);
        assert_eq!(result.lines[1].amount.cents(), 8_550);
        assert_eq!(result.total.cents(), 17_100);
    }

    #[test]
    fn test_components_are_additive_not_compounded() {
        let stack = TaxStack::from_raw([
            ("VAT", 1_000, TaxBase::ItemsTotal),
            ("IGST", 1_000, TaxBase::ItemsTotal),
        ])
        .unwrap();
        let result = stack.apply(bases(10_000, 10_000)).unwrap();
        // compounding would give 10.00 + 11.00
        assert_eq!(result.total.cents(), 2_000);
    }

    #[test]
    fn test_base_selector_is_respected() {
        let stack = TaxStack::from_raw([
            ("VAT", 500, TaxBase::ItemsTotal),
            ("CGST", 500, TaxBase::AfterDiscount),
        ])
        .unwrap();
        let result = stack.apply(bases(20_000, 10_000)).unwrap();
        assert_eq!(result.lines[0].taxable.cents(), 20_000);
        assert_eq!(result.lines[0].amount.cents(), 1_000);
        assert_eq!(result.lines[1].taxable.cents(), 10_000);
        assert_eq!(result.lines[1].amount.cents(), 500);
    }

    #[test]
    fn test_negative_rate_rejected() {
        let err = TaxStack::from_raw([("CGST", 900, TaxBase::AfterDiscount), ("SGST", -900, TaxBase::AfterDiscount)])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTaxRate { bps: -900 }));
    }

    #[test]
    fn test_empty_stack_is_zero() {
        let result = TaxStack::default().apply(bases(12_345, 12_345)).unwrap();
        assert!(result.lines.is_empty());
        assert!(result.total.is_zero());
    }

    #[test]
    fn test_component_requires_name() {
        assert!(TaxComponent::new(" ", 100, TaxBase::ItemsTotal).is_err());
    }

    #[test]
    fn test_component_amount_overflow() {
        let stack = TaxStack::new(vec![TaxComponent::cgst(Rate::from_bps(20_000))]);
        let err = stack.apply(bases(i64::MAX, i64::MAX)).unwrap_err();
        assert!(matches!(err, CoreError::AmountOverflow { .. }));
    }
}
