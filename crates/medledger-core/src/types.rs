//! # Domain Types
//!
//! Core domain types used throughout MedLedger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────┐      │
//! │  │    Product      │◄──│     Batch       │◄──│ StockLedgerEntry │      │
//! │  │  id, sku        │   │  batch_no       │   │  delta (signed)  │      │
//! │  │  unit_price     │   │  expiry_date    │   │  reason          │      │
//! │  │  reorder_level  │   │  qty_remaining  │   │  reference_order │      │
//! │  │  stock_quantity │   │  purchase_price │   │  (append-only)   │      │
//! │  └─────────────────┘   └─────────────────┘   └──────────────────┘      │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Sale (+lines) │   │Purchase (+lines)│──►│      Grn        │       │
//! │  │  Committed      │   │ AwaitingReceipt │   │  at most one    │       │
//! │  │  Voided         │   │ Received        │   │  per purchase   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariant
//! `Σ delta` over a (product, batch) pair equals the batch's
//! `quantity_remaining`, and over a product equals its `stock_quantity`.
//! Only the ledger repository writes either column.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Rate
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 900 bps = 9% (CGST) and 10000 bps = 100%.
/// Used for GST/VAT rates, order tax components and line discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from untrusted input, rejecting negative percentages.
    ///
    /// ```rust
    /// use medledger_core::types::Rate;
    ///
    /// assert_eq!(Rate::try_from_bps(900).unwrap().bps(), 900);
    /// assert!(Rate::try_from_bps(-1).is_err());
    /// ```
    pub fn try_from_bps(bps: i64) -> CoreResult<Self> {
        u32::try_from(bps)
            .map(Rate)
            .map_err(|_| CoreError::InvalidTaxRate { bps })
    }

    /// Creates a rate from a percentage such as `9.0` or `2.5`.
    pub fn try_from_percentage(pct: f64) -> CoreResult<Self> {
        if !pct.is_finite() {
            return Err(CoreError::InvalidTaxRate { bps: -1 });
        }
        Rate::try_from_bps((pct * 100.0).round() as i64)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A catalog product.
///
/// Orders and ledger entries reference it by `id`; nothing copies it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Default cost in minor units; COGS fallback for non-batch stock.
    pub unit_cost_cents: i64,

    /// Default selling price in minor units.
    pub unit_price_cents: i64,

    /// Default GST/VAT rate in basis points.
    pub gst_rate_bps: u32,

    /// Stock level at or below which the product is flagged for reorder.
    pub reorder_level: i64,

    /// Whether stock is accounted per batch (pharmacy goods).
    pub batch_tracked: bool,

    /// Current stock; equals the ledger sum for this product.
    pub stock_quantity: i64,

    /// Optimistic concurrency counter, bumped on every stock change.
    pub version: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    #[inline]
    pub fn gst_rate(&self) -> Rate {
        Rate::from_bps(self.gst_rate_bps)
    }

    /// Checks if the product has fallen to its reorder level.
    pub fn needs_reorder(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }
}

// =============================================================================
// Batch
// =============================================================================

/// A manufacturing lot of a product.
///
/// Created only by a confirmed GRN or opening stock. `quantity_remaining`
/// changes only through ledger entries that reference the batch.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Batch {
    pub id: String,
    pub product_id: String,
    pub batch_no: String,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    /// Total units ever credited by receipts.
    pub quantity_received: i64,
    pub quantity_remaining: i64,
    /// Unit purchase price in minor units (COGS source).
    pub purchase_price_cents: i64,
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Batch {
    #[inline]
    pub fn purchase_price(&self) -> Money {
        Money::from_cents(self.purchase_price_cents)
    }

    /// Days until expiry relative to `today`; negative once expired.
    pub fn days_to_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry_date.map(|d| (d - today).num_days())
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < today)
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// GRN receipt of a purchase (IN).
    Purchase,
    /// Sale dispensing (OUT); a void appends the positive reversal.
    Sale,
    /// Customer return (IN).
    SalesReturn,
    /// Goods sent back to the supplier (OUT).
    SupplierReturn,
    /// Initial stock load (IN).
    OpeningStock,
    /// Manual write-on / write-off (either sign).
    Adjustment,
}

impl LedgerReason {
    pub const ALL: [LedgerReason; 6] = [
        LedgerReason::Purchase,
        LedgerReason::Sale,
        LedgerReason::SalesReturn,
        LedgerReason::SupplierReturn,
        LedgerReason::OpeningStock,
        LedgerReason::Adjustment,
    ];

    /// The stored text form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::Purchase => "purchase",
            LedgerReason::Sale => "sale",
            LedgerReason::SalesReturn => "sales_return",
            LedgerReason::SupplierReturn => "supplier_return",
            LedgerReason::OpeningStock => "opening_stock",
            LedgerReason::Adjustment => "adjustment",
        }
    }

    /// Parses the stored text form.
    pub fn parse(s: &str) -> Option<Self> {
        LedgerReason::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable stock movement.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLedgerEntry {
    pub id: String,
    pub product_id: String,
    /// `None` for products that are not batch-tracked.
    pub batch_id: Option<String>,
    /// Positive for IN, negative for OUT.
    pub delta: i64,
    pub reason: LedgerReason,
    /// Sale, purchase or adjustment that caused the movement.
    pub reference_order_id: Option<String>,
    /// Set on reversing entries (sale voids).
    pub reverses_entry_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Order Kind
// =============================================================================

/// The two order variants. They share the pricing path and differ in how
/// they touch the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Sale,
    Purchase,
}

impl OrderKind {
    /// Reason on the ledger entries the order produces.
    pub const fn ledger_reason(&self) -> LedgerReason {
        match self {
            OrderKind::Sale => LedgerReason::Sale,
            OrderKind::Purchase => LedgerReason::Purchase,
        }
    }

    /// Purchases credit stock only through a GRN, never on commit.
    pub const fn requires_grn(&self) -> bool {
        matches!(self, OrderKind::Purchase)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Lifecycle of a persisted sale. Drafts live only in memory
/// ([`crate::order::DraftOrder`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Committed,
    Voided,
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaleStatus::Committed => f.write_str("committed"),
            SaleStatus::Voided => f.write_str("voided"),
        }
    }
}

/// A committed sale with its frozen totals.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub invoice_no: String,
    pub customer_name: Option<String>,
    pub status: SaleStatus,
    pub items_total_cents: i64,
    pub order_discount_cents: i64,
    pub total_tax_cents: i64,
    pub grand_total_cents: i64,
    pub paid_cents: i64,
    pub balance_due_cents: i64,
    /// EMI term when installments were scheduled.
    pub emi_months: Option<u32>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }

    #[inline]
    pub fn balance_due(&self) -> Money {
        Money::from_cents(self.balance_due_cents)
    }
}

/// A sale line with price inputs and computed amounts frozen at commit.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    pub line_no: i64,
    pub product_id: String,
    pub batch_id: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_bps: u32,
    pub gst_bps: u32,
    pub taxable_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
    /// Units already taken back through sales returns.
    pub returned_quantity: i64,
}

impl SaleLine {
    /// Units that can still be returned.
    pub fn returnable(&self) -> i64 {
        self.quantity - self.returned_quantity
    }
}

// =============================================================================
// Purchase & GRN
// =============================================================================

/// GRN state of a purchase. `Received` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    AwaitingReceipt,
    Received,
}

/// A supplier purchase order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Purchase {
    pub id: String,
    pub supplier_name: Option<String>,
    pub invoice_no: Option<String>,
    pub status: PurchaseStatus,
    pub items_total_cents: i64,
    pub order_discount_cents: i64,
    pub total_tax_cents: i64,
    pub grand_total_cents: i64,
    pub paid_cents: i64,
    pub balance_due_cents: i64,
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
}

/// A purchase line with the incoming batch details.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseLine {
    pub id: String,
    pub purchase_id: String,
    pub line_no: i64,
    pub product_id: String,
    pub batch_no: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_bps: u32,
    pub gst_bps: u32,
    pub line_total_cents: i64,
}

/// Goods Receipt Note. Immutable; at most one per purchase.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Grn {
    pub id: String,
    pub purchase_id: String,
    /// Number of purchase lines credited.
    pub received_lines: i64,
    pub received_units: i64,
    /// Value of the received quantities at purchase pricing.
    pub received_value_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
