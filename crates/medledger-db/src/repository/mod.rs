//! # Repository Module
//!
//! Database repository implementations for MedLedger.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Who Writes What                                      │
//! │                                                                         │
//! │  SaleRepository      commit_sale / return_items / void_sale            │
//! │  PurchaseRepository  create_purchase / confirm_grn                     │
//! │  StockRepository     opening_stock / adjust / supplier_return          │
//! │       │                                                                 │
//! │       │  one transaction per call                                       │
//! │       ▼                                                                 │
//! │  ledger::credit / ledger::debit                                        │
//! │  ├── batches.quantity_remaining   (guarded, never below zero)         │
//! │  ├── products.stock_quantity      (guarded, never below zero)         │
//! │  └── stock_ledger                 (append-only)                       │
//! │                                                                         │
//! │  ProductRepository, BatchRepository, LedgerRepository and              │
//! │  ReportRepository only read stock.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`] - Catalog
//! - [`BatchRepository`] - Batch lookups in FEFO order
//! - [`LedgerRepository`] - Ledger queries and consistency checks
//! - [`SaleRepository`] - Sale commit, returns and voids
//! - [`PurchaseRepository`] - Purchases and goods receipt
//! - [`StockRepository`] - Opening stock, adjustments, supplier returns
//! - [`ReportRepository`] - Reorder, expiry and cost reports

pub mod batch;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod ledger;
pub(crate) mod order_tax;
pub mod product;
pub mod purchase;
pub mod report;
pub mod sale;
pub mod stock;

pub use batch::BatchRepository;
pub use ledger::{BatchMismatch, ConsistencyReport, LedgerRepository};
pub use product::{NewProduct, ProductRepository};
pub use purchase::{GrnLine, GrnLineInput, PurchaseRepository};
pub use report::{CostOfGoodsSold, ExpiringBatch, MovementSummary, ReasonTotals, ReportRepository};
pub use sale::{ReturnLine, SaleRepository};
pub use stock::{OpeningStock, StockMovement, StockRepository};
