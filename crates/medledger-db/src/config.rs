//! # Ledger Configuration
//!
//! Configuration for the database pool, the tax catalogue and inventory
//! alerts.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MEDLEDGER_DB_PATH=/var/lib/medledger/ledger.db                     │
//! │     MEDLEDGER_BUSY_TIMEOUT_SECS=10                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/medledger/medledger.toml (Linux)                         │
//! │     ~/Library/Application Support/com.medledger.medledger/… (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "medledger.db"
//! max_connections = 5
//! busy_timeout_secs = 5
//!
//! [[taxes.components]]
//! name = "CGST"
//! rate_bps = 900
//! base = "after_discount"
//!
//! [[taxes.components]]
//! name = "SGST"
//! rate_bps = 900
//! base = "after_discount"
//!
//! [taxes]
//! sale_stack = []
//! purchase_stack = ["CGST", "SGST"]
//!
//! [inventory]
//! reorder_window_days = 30
//! expiry_alert_days = 90
//! ```
//!
//! A component's base is fixed here, never chosen per order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use medledger_core::tax::{TaxBase, TaxComponent, TaxStack};
use medledger_core::validation::validate_window_days;
use medledger_core::OrderKind;

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a writer waits for the SQLite write lock before failing
    /// with `DbError::Busy`.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("medledger.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Tax Settings
// =============================================================================

/// One entry of the tax catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxComponentSettings {
    pub name: String,
    /// Basis points; negative values are rejected by `validate()`.
    pub rate_bps: i64,
    #[serde(default)]
    pub base: TaxBase,
}

/// The tax catalogue and which components apply to each order kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxSettings {
    #[serde(default)]
    pub components: Vec<TaxComponentSettings>,

    /// Component names applied to sales, in order.
    #[serde(default)]
    pub sale_stack: Vec<String>,

    /// Component names applied to purchases, in order.
    #[serde(default)]
    pub purchase_stack: Vec<String>,
}

impl TaxSettings {
    /// Builds a stack from catalogue names.
    pub fn stack(&self, names: &[String]) -> DbResult<TaxStack> {
        names
            .iter()
            .map(|name| {
                let entry = self
                    .components
                    .iter()
                    .find(|c| &c.name == name)
                    .ok_or_else(|| DbError::InvalidConfig(format!("unknown tax component '{name}'")))?;
                TaxComponent::new(entry.name.clone(), entry.rate_bps, entry.base)
                    .map_err(|e| DbError::InvalidConfig(format!("tax component '{name}': {e}")))
            })
            .collect::<DbResult<Vec<_>>>()
            .map(TaxStack::new)
    }

    /// The configured stack for an order kind.
    pub fn stack_for(&self, kind: OrderKind) -> DbResult<TaxStack> {
        match kind {
            OrderKind::Sale => self.stack(&self.sale_stack),
            OrderKind::Purchase => self.stack(&self.purchase_stack),
        }
    }
}

// =============================================================================
// Inventory Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// Look-back window for average daily consumption.
    #[serde(default = "default_reorder_window")]
    pub reorder_window_days: u32,

    /// Batches expiring within this many days are reported.
    #[serde(default = "default_expiry_alert")]
    pub expiry_alert_days: u32,
}

fn default_reorder_window() -> u32 {
    30
}

fn default_expiry_alert() -> u32 {
    90
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            reorder_window_days: default_reorder_window(),
            expiry_alert_days: default_expiry_alert(),
        }
    }
}

// =============================================================================
// Ledger Config
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub taxes: TaxSettings,

    #[serde(default)]
    pub inventory: InventorySettings,
}

impl LedgerConfig {
    /// Loads configuration: defaults, then the TOML file (if present), then
    /// environment overrides, then validation.
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration, falling back to defaults on any error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn from_toml(contents: &str) -> DbResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> DbResult<()> {
        let db = &self.database;
        if db.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if db.min_connections > db.max_connections {
            return Err(DbError::InvalidConfig(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                db.min_connections, db.max_connections
            )));
        }

        let mut names = HashSet::new();
        for component in &self.taxes.components {
            if !names.insert(component.name.as_str()) {
                return Err(DbError::InvalidConfig(format!(
                    "duplicate tax component '{}'",
                    component.name
                )));
            }
            TaxComponent::new(component.name.clone(), component.rate_bps, component.base)
                .map_err(|e| DbError::InvalidConfig(format!("tax component '{}': {e}", component.name)))?;
        }
        self.taxes.stack(&self.taxes.sale_stack)?;
        self.taxes.stack(&self.taxes.purchase_stack)?;

        validate_window_days(self.inventory.reorder_window_days)
            .map_err(|e| DbError::InvalidConfig(format!("inventory.{e}")))?;

        Ok(())
    }

    /// Applies `MEDLEDGER_*` environment variables.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("MEDLEDGER_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(value) = lookup("MEDLEDGER_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %value, "Ignoring invalid MEDLEDGER_MAX_CONNECTIONS"),
            }
        }

        if let Some(value) = lookup("MEDLEDGER_BUSY_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(n) => self.database.busy_timeout_secs = n,
                Err(_) => warn!(value = %value, "Ignoring invalid MEDLEDGER_BUSY_TIMEOUT_SECS"),
            }
        }

        if let Some(value) = lookup("MEDLEDGER_REORDER_WINDOW_DAYS") {
            match value.parse::<u32>() {
                Ok(n) => self.inventory.reorder_window_days = n,
                Err(_) => warn!(value = %value, "Ignoring invalid MEDLEDGER_REORDER_WINDOW_DAYS"),
            }
        }

        if let Some(value) = lookup("MEDLEDGER_EXPIRY_ALERT_DAYS") {
            match value.parse::<u32>() {
                Ok(n) => self.inventory.expiry_alert_days = n,
                Err(_) => warn!(value = %value, "Ignoring invalid MEDLEDGER_EXPIRY_ALERT_DAYS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "medledger", "medledger")
            .map(|dirs| dirs.config_dir().join("medledger.toml"))
    }

    /// Pool settings derived from `[database]`.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
