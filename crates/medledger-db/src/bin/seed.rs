//! # Demo Pharmacy Seeder
//!
//! Populates a database with a small pharmacy and walks one purchase and
//! one sale through the ledger, printing the results as JSON.
//!
//! ## Usage
//! ```bash
//! # Seed ./medledger_dev.db
//! cargo run -p medledger-db --bin seed
//!
//! # Specify database path and config file
//! cargo run -p medledger-db --bin seed -- --db ./data/pharmacy.db --config ./medledger.toml
//! ```
//!
//! ## What It Does
//! ```text
//! catalog (6 products)
//!   → purchase from a distributor (purchase tax stack)
//!   → GRN confirmed: batches created, stock credited
//!   → opening stock for the untracked items
//!   → sale on 6-month EMI (sale tax stack), drawn from the earliest batch
//!   → reorder / expiry / COGS reports
//! ```
//!
//! When the config file defines no tax stacks, CGST 6% + SGST 6% on the
//! discounted items total is used for both.

use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use medledger_core::{DraftOrder, Money, OrderKind, OrderLine, Rate, TaxComponent, TaxStack};
use medledger_db::{Database, LedgerConfig, NewProduct, OpeningStock};

/// (sku, name, unit cost, unit price, GST bps, reorder level, batch tracked)
const CATALOG: &[(&str, &str, i64, i64, u32, i64, bool)] = &[
    ("PCM-500", "Paracetamol 500mg (strip of 10)", 1_800, 2_500, 1200, 40, true),
    ("AMX-250", "Amoxicillin 250mg (strip of 10)", 6_500, 9_000, 1200, 20, true),
    ("MET-500", "Metformin 500mg (strip of 15)", 2_200, 3_200, 1200, 30, true),
    ("INS-GLA", "Insulin Glargine 100IU/ml pen", 52_000, 68_000, 500, 5, true),
    ("ORS-200", "ORS sachet 21g", 1_500, 2_000, 1200, 50, false),
    ("BND-CRP", "Crepe bandage 10cm", 9_000, 14_000, 1200, 10, false),
];

/// (sku, quantity, batch_no, months to expiry)
const PURCHASE: &[(&str, i64, &str, u32)] = &[
    ("PCM-500", 200, "PCM-24A17", 18),
    ("AMX-250", 60, "AMX-24B03", 2),
    ("MET-500", 120, "MET-24C22", 24),
    ("INS-GLA", 8, "INS-24D09", 9),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./medledger_dev.db");
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("MedLedger Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: ./medledger_dev.db)");
                println!("  -c, --config <PATH>    medledger.toml to read tax stacks from");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::load_or_default(config_path);
    config.database.path = PathBuf::from(&db_path);

    let db = Database::new(config.db_config()).await?;
    info!(path = %db_path, "Connected to database");

    if db.products().count().await? > 0 {
        println!("Database already has products; delete {db_path} to reseed.");
        return Ok(());
    }

    let purchase_taxes = taxes_for(&config, OrderKind::Purchase)?;
    let sale_taxes = taxes_for(&config, OrderKind::Sale)?;

    // Catalog
    let mut products = Vec::new();
    for &(sku, name, cost, price, gst, reorder, tracked) in CATALOG {
        let mut new = NewProduct::new(sku, name, Money::from_cents(price))
            .with_cost(Money::from_cents(cost))
            .with_gst(Rate::from_bps(gst))
            .with_reorder_level(reorder);
        if !tracked {
            new = new.untracked();
        }
        products.push(db.products().insert(&new).await?);
    }
    info!(count = products.len(), "Catalog created");

    let find = |sku: &str| {
        products
            .iter()
            .find(|p| p.sku == sku)
            .ok_or_else(|| format!("{sku} missing from catalog"))
    };

    // Purchase and goods receipt
    let today = Utc::now().date_naive();
    let mut draft = DraftOrder::purchase()
        .with_counterparty("Shree Ganesh Distributors")
        .with_invoice_no(format!("SGD-{}", today.format("%Y%m%d")));
    for &(sku, quantity, batch_no, months) in PURCHASE {
        let product = find(sku)?;
        draft.add_line(
            OrderLine::new(&product.id, quantity, product.unit_cost())
                .with_gst(product.gst_rate())
                .into_batch(batch_no, Some(months_ahead(today, months))),
        )?;
    }
    draft.set_order_discount(Money::from_cents(5_000))?;
    draft.set_taxes(purchase_taxes);

    let purchase = db.purchases().create_purchase(&draft).await?;
    let grn = db.purchases().confirm_grn(&purchase.id, &[]).await?;
    info!(purchase_id = %purchase.id, units = grn.received_units, "Goods received");

    for sku in ["ORS-200", "BND-CRP"] {
        let product = find(sku)?;
        db.stock()
            .opening_stock(&OpeningStock::untracked(&product.id, 25))
            .await?;
    }

    // Sale on EMI
    let insulin = find("INS-GLA")?;
    let paracetamol = find("PCM-500")?;
    let ors = find("ORS-200")?;

    let mut sale_draft = DraftOrder::sale().with_counterparty("R. Iyer");
    for (product, quantity) in [(insulin, 3), (paracetamol, 4)] {
        let batch = db
            .batches()
            .available_for_product(&product.id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| format!("no stock for {}", product.sku))?;
        sale_draft.add_line(OrderLine::from_product(product, quantity).from_batch(batch.id))?;
    }
    sale_draft.add_line(OrderLine::from_product(ors, 5).with_discount(Rate::from_bps(1000)))?;
    sale_draft.set_taxes(sale_taxes);
    sale_draft.enable_emi(6)?;
    let totals = sale_draft.totals()?;
    sale_draft.set_paid(totals.grand_total.split_floor(6).0)?;

    let sale = db.sales().commit_sale(&sale_draft).await?;
    let installments = db.sales().get_installments(&sale.id).await?;
    info!(invoice_no = %sale.invoice_no, "Sale committed");

    // Reports
    let now = Utc::now();
    let reorder = db
        .reports()
        .reorder_suggestions(config.inventory.reorder_window_days, now, 20)
        .await?;
    let expiring = db
        .reports()
        .expiring_batches(config.inventory.expiry_alert_days, today)
        .await?;
    let cogs = db
        .reports()
        .cost_of_goods_sold(now - Duration::days(1), now)
        .await?;
    let inconsistent = db.ledger().find_inconsistencies().await?;

    let summary = json!({
        "database": db_path,
        "products": products.len(),
        "purchase": purchase,
        "purchase_taxes": db.purchases().get_taxes(&purchase.id).await?,
        "grn": grn,
        "sale": sale,
        "sale_lines": db.sales().get_lines(&sale.id).await?,
        "sale_taxes": db.sales().get_taxes(&sale.id).await?,
        "installments": installments,
        "reorder_suggestions": reorder,
        "expiring_batches": expiring,
        "cost_of_goods_sold": cogs,
        "ledger_consistent": inconsistent.is_empty(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    db.close().await;
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,medledger=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The configured stack for `kind`, or intra-state GST at 6% + 6%.
fn taxes_for(config: &LedgerConfig, kind: OrderKind) -> Result<TaxStack, Box<dyn std::error::Error>> {
    let stack = config.taxes.stack_for(kind)?;
    if !stack.is_empty() {
        return Ok(stack);
    }
    Ok(TaxStack::new(vec![
        TaxComponent::cgst(Rate::from_bps(600)),
        TaxComponent::sgst(Rate::from_bps(600)),
    ]))
}

fn months_ahead(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(chrono::Months::new(months))
        .unwrap_or(date)
}
