//! # Installment Scheduler
//!
//! Flat EMI: the grand total is split into equal monthly installments and
//! the last one takes whatever the split could not distribute.
//!
//! ```text
//! 1000.00 over 3 months, sold 2026-01-15
//!
//!   #1  2026-02-15  333.33
//!   #2  2026-03-15  333.33
//!   #3  2026-04-15  333.34   ◄── base + residual
//!                   ───────
//!                   1000.00  (exact)
//! ```
//!
//! Interest is not computed here. An interest-bearing plan inflates the
//! grand total before it is scheduled.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::validate_non_negative;

/// Supported EMI terms, in months.
pub const SUPPORTED_TERMS: [u32; 4] = [3, 6, 12, 24];

/// One scheduled installment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InstallmentLine {
    /// 1-based position in the plan.
    pub due_index: u32,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
    pub amount: Money,
}

/// Rejects terms other than 3, 6, 12 or 24 months.
pub fn validate_term(months: u32) -> CoreResult<()> {
    if SUPPORTED_TERMS.contains(&months) {
        Ok(())
    } else {
        Err(CoreError::InvalidInstallmentTerm { months })
    }
}

/// Splits `grand_total` into `months` installments.
///
/// `Σ amount == grand_total` for every valid input. Installment `k` falls
/// due `k` calendar months after `sale_date`; dates past the end of a short
/// month clamp to its last day.
///
/// ```rust
/// use chrono::NaiveDate;
/// use medledger_core::installment::schedule_installments;
/// use medledger_core::money::Money;
///
/// let sold = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
/// let plan = schedule_installments(Money::from_cents(100_000), 3, sold).unwrap();
/// assert_eq!(plan[2].amount.cents(), 33_334);
/// ```
pub fn schedule_installments(
    grand_total: Money,
    months: u32,
    sale_date: NaiveDate,
) -> CoreResult<Vec<InstallmentLine>> {
    validate_term(months)?;
    validate_non_negative("grand_total", grand_total)?;

    let (base, residual) = grand_total.split_floor(months);

    (1..=months)
        .map(|due_index| -> CoreResult<InstallmentLine> {
            let due_date = sale_date
                .checked_add_months(Months::new(due_index))
                .ok_or_else(|| ValidationError::InvalidFormat {
                    field: "sale_date".to_string(),
                    reason: "installment due date is out of range".to_string(),
                })?;
            let amount = if due_index == months { base + residual } else { base };
            Ok(InstallmentLine {
                due_index,
                due_date,
                amount,
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_three_month_split() {
        let plan = schedule_installments(Money::from_cents(100_000), 3, date(2026, 1, 15)).unwrap();
        let amounts: Vec<i64> = plan.iter().map(|l| l.amount.cents()).collect();
        assert_eq!(amounts, vec![33_333, 33_333, 33_334]);
        assert_eq!(plan[0].due_index, 1);
        assert_eq!(plan[0].due_date, date(2026, 2, 15));
        assert_eq!(plan[2].due_date, date(2026, 4, 15));
    }

    #[test]
    fn test_sum_is_exact_for_every_term() {
        for total in [0, 1, 99, 100_000, 112_100, 99_999_997] {
            for months in SUPPORTED_TERMS {
                let plan = schedule_installments(Money::from_cents(total), months, date(2026, 5, 1)).unwrap();
                assert_eq!(plan.len(), months as usize);
                let sum: Money = plan.iter().map(|l| l.amount).sum();
                assert_eq!(sum.cents(), total, "total {total} over {months}");
            }
        }
    }

    #[test]
    fn test_due_dates_clamp_to_month_end() {
        let plan = schedule_installments(Money::from_cents(60_000), 6, date(2026, 1, 31)).unwrap();
        assert_eq!(plan[0].due_date, date(2026, 2, 28));
        assert_eq!(plan[1].due_date, date(2026, 3, 31));
        assert_eq!(plan[2].due_date, date(2026, 4, 30));
    }

    #[test]
    fn test_unsupported_terms() {
        for months in [0, 1, 4, 36] {
            assert!(matches!(
                schedule_installments(Money::from_cents(1_000), months, date(2026, 1, 1)),
                Err(CoreError::InvalidInstallmentTerm { .. })
            ));
        }
    }

    #[test]
    fn test_negative_total_rejected() {
        assert!(matches!(
            schedule_installments(Money::from_cents(-1), 3, date(2026, 1, 1)),
            Err(CoreError::Validation(_))
        ));
    }
}
