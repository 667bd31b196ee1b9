//! # Error Types
//!
//! Domain-specific error types for medledger-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  medledger-core errors (this file)                                     │
//! │  ├── CoreError        - Pricing rules and stock state conflicts        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  medledger-db errors (separate crate)                                  │
//! │  └── DbError          - Storage failures; wraps CoreError              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant is scoped to the single order or transaction being
//! processed. None of them is retried inside the engine.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Pricing, ordering and stock-ledger errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A line has a non-positive quantity, a negative unit price, a discount
    /// outside 0–100%, or amounts that overflow.
    #[error("Invalid line item: {reason}")]
    InvalidLineItem { reason: String },

    /// A tax (or discount) percentage is negative.
    #[error("Invalid tax rate: {bps} bps")]
    InvalidTaxRate { bps: i64 },

    /// An order-level sum or tax amount does not fit in the money type.
    #[error("Amount overflow in {context}")]
    AmountOverflow { context: String },

    /// The order-level discount is larger than the items total.
    #[error("Discount {discount} exceeds items total {items_total}")]
    DiscountExceedsTotal { discount: Money, items_total: Money },

    /// An OUT entry would drive a batch or product below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale line: qty 5 from batch B-1042
    ///      │
    ///      ▼
    /// guarded decrement: quantity_remaining = 3
    ///      │
    ///      ▼
    /// InsufficientStock { available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// whole sale rejected, ledger unchanged
    /// ```
    #[error("Insufficient stock for {target}: available {available}, requested {requested}")]
    InsufficientStock {
        target: String,
        available: i64,
        requested: i64,
    },

    /// The purchase already has its GRN.
    #[error("Purchase {purchase_id} has already been received")]
    AlreadyReceived { purchase_id: String },

    #[error("Purchase not found: {0}")]
    PurchaseNotFound(String),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    /// EMI terms other than 3, 6, 12 or 24 months.
    #[error("Unsupported installment term: {months} months")]
    InvalidInstallmentTerm { months: u32 },

    /// The sale is not in a state that allows the requested operation
    /// (e.g. voiding twice).
    #[error("Sale {sale_id} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
    },

    /// A sales return asks for more units than remain returnable.
    #[error("Return of {requested} exceeds returnable quantity {returnable} on sale line {sale_line_id}")]
    ReturnExceedsSold {
        sale_line_id: String,
        returnable: i64,
        requested: i64,
    },

    /// An order without lines cannot be committed.
    #[error("Order has no line items")]
    EmptyOrder,

    #[error("Order cannot have more than {max} lines")]
    OrderTooLarge { max: usize },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidLineItem error.
    pub fn invalid_line(reason: impl Into<String>) -> Self {
        CoreError::InvalidLineItem {
            reason: reason.into(),
        }
    }

    pub fn overflow(context: impl Into<String>) -> Self {
        CoreError::AmountOverflow {
            context: context.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, bad batch number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
