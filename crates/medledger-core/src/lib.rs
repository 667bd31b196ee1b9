//! # medledger-core: Pricing and Order Rules for MedLedger
//!
//! Pure calculation layer of the pharmacy back office. Everything here is
//! synchronous and free of I/O; the database crate calls into it and
//! persists the results.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MedLedger Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              UI / API layer (POS, purchase desk)                │   │
//! │  │       builds DraftOrder ──► shows totals ──► commits            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ medledger-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌─────────────┐    │   │
//! │  │   │  pricing │  │   tax    │  │  totals  │  │ installment │    │   │
//! │  │   │ per line │─►│  stack   │─►│  order   │─►│  flat EMI   │    │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └─────────────┘    │   │
//! │  │   order (DraftOrder) • reorder (StockSnapshot) • types • money │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                medledger-db (SQLite layer)                      │   │
//! │  │     stock ledger, GRN transitions, sales, reports               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer money with half-up rounding
//! - [`types`] - Domain types (Product, Batch, ledger entries, Sale, Purchase, GRN)
//! - [`pricing`] - Line item calculator
//! - [`tax`] - Additive tax components (CGST, SGST, IGST, VAT)
//! - [`totals`] - Order aggregator
//! - [`installment`] - EMI scheduler
//! - [`order`] - Draft order aggregate
//! - [`reorder`] - Reorder snapshot
//! - [`error`] / [`validation`] - Error taxonomy and input checks
//!
//! ## Example Usage
//!
//! ```rust
//! use medledger_core::{DraftOrder, Money, OrderLine, Rate};
//!
//! let mut order = DraftOrder::sale();
//! order
//!     .add_line(OrderLine::new("prod-1", 2, Money::from_cents(5_000)).with_gst(Rate::from_bps(500)))
//!     .unwrap();
//!
//! let totals = order.totals().unwrap();
//! assert_eq!(totals.items_total.cents(), 10_000);
//! assert_eq!(totals.grand_total.cents(), 10_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod installment;
pub mod money;
pub mod order;
pub mod pricing;
pub mod reorder;
pub mod tax;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use installment::{schedule_installments, InstallmentLine};
pub use money::Money;
pub use order::{BatchRef, DraftOrder, OrderLine};
pub use pricing::{compute_line, compute_line_total, LineBreakdown};
pub use reorder::{DaysOfSupply, StockSnapshot};
pub use tax::{TaxBase, TaxComponent, TaxStack};
pub use totals::{compute_order_totals, OrderTotals};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines on a single order.
///
/// Large enough for a wholesale purchase invoice, small enough to keep a
/// commit transaction short.
pub const MAX_ORDER_LINES: usize = 200;

/// Maximum quantity on a single line.
///
/// Catches typos such as 10000 for 100 strips.
pub const MAX_LINE_QUANTITY: i64 = 100_000;
