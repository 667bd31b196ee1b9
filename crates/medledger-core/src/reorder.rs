//! # Reorder Contract
//!
//! Per-product figures the reorder screen and downstream heuristics read.
//! Velocity tiers and ABC classes are computed elsewhere; this module only
//! guarantees the inputs are ledger-derived.
//!
//! ```text
//! current_stock          = Σ ledger delta          (always consistent)
//! avg_daily_consumption  = net units sold in window / window_days
//! days_of_supply         = current_stock / avg_daily_consumption
//!                          └── Unbounded when nothing was consumed
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreResult;
use crate::validation::validate_window_days;

/// How long current stock lasts at the observed rate.
///
/// Zero consumption is modelled explicitly so no caller divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum DaysOfSupply {
    Finite(f64),
    Unbounded,
}

impl DaysOfSupply {
    pub fn is_unbounded(&self) -> bool {
        matches!(self, DaysOfSupply::Unbounded)
    }

    /// True when stock runs out within `days`.
    pub fn runs_out_within(&self, days: f64) -> bool {
        match self {
            DaysOfSupply::Finite(d) => *d <= days,
            DaysOfSupply::Unbounded => false,
        }
    }
}

/// Reorder inputs for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockSnapshot {
    pub product_id: String,
    pub current_stock: i64,
    pub reorder_level: i64,
    pub window_days: u32,
    /// Units sold in the window net of voids and sales returns.
    pub units_consumed: i64,
    pub avg_daily_consumption: f64,
    pub days_of_supply: DaysOfSupply,
}

impl StockSnapshot {
    /// Builds a snapshot from ledger figures.
    ///
    /// A window where returns outweigh sales counts as zero consumption.
    ///
    /// ```rust
    /// use medledger_core::reorder::{DaysOfSupply, StockSnapshot};
    ///
    /// let snap = StockSnapshot::compute("p", 60, 10, 90, 30).unwrap();
    /// assert_eq!(snap.avg_daily_consumption, 3.0);
    /// assert_eq!(snap.days_of_supply, DaysOfSupply::Finite(20.0));
    /// ```
    pub fn compute(
        product_id: impl Into<String>,
        current_stock: i64,
        reorder_level: i64,
        units_consumed: i64,
        window_days: u32,
    ) -> CoreResult<Self> {
        validate_window_days(window_days)?;

        let units_consumed = units_consumed.max(0);
        let avg_daily_consumption = units_consumed as f64 / f64::from(window_days);
        let days_of_supply = if units_consumed == 0 {
            DaysOfSupply::Unbounded
        } else {
            DaysOfSupply::Finite(current_stock.max(0) as f64 / avg_daily_consumption)
        };

        Ok(StockSnapshot {
            product_id: product_id.into(),
            current_stock,
            reorder_level,
            window_days,
            units_consumed,
            avg_daily_consumption,
            days_of_supply,
        })
    }

    pub fn needs_reorder(&self) -> bool {
        self.current_stock <= self.reorder_level
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_days_of_supply() {
        let snap = StockSnapshot::compute("p", 45, 10, 30, 30).unwrap();
        assert_eq!(snap.avg_daily_consumption, 1.0);
        assert_eq!(snap.days_of_supply, DaysOfSupply::Finite(45.0));
        assert!(snap.days_of_supply.runs_out_within(60.0));
        assert!(!snap.needs_reorder());
    }

    #[test]
    fn test_zero_consumption_is_unbounded() {
        let snap = StockSnapshot::compute("p", 5, 10, 0, 30).unwrap();
        assert!(snap.days_of_supply.is_unbounded());
        assert!(!snap.days_of_supply.runs_out_within(10_000.0));
        assert!(snap.needs_reorder());
    }

    #[test]
    fn test_net_returns_count_as_zero() {
        let snap = StockSnapshot::compute("p", 5, 0, -4, 7).unwrap();
        assert_eq!(snap.units_consumed, 0);
        assert!(snap.days_of_supply.is_unbounded());
    }

    #[test]
    fn test_out_of_stock_with_demand() {
        let snap = StockSnapshot::compute("p", 0, 0, 14, 7).unwrap();
        assert_eq!(snap.days_of_supply, DaysOfSupply::Finite(0.0));
    }

    #[test]
    fn test_window_must_be_positive() {
        assert!(StockSnapshot::compute("p", 5, 0, 3, 0).is_err());
    }
}
