//! Subcommand handlers.
//!
//! Each handler returns the process exit code. Reports print to stdout;
//! logs go to stderr.

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use tracing::info;

use tally_core::validation::validate_sku;
use tally_core::{Money, StockSource, SyncStage};
use tally_db::{Database, DbConfig};
use tally_sync::sales::SalesWindow;
use tally_sync::{CycleReport, SyncAgent, SyncConfig};

use crate::render;
use crate::Command;

pub(crate) async fn dispatch(config_path: Option<PathBuf>, command: Command) -> anyhow::Result<i32> {
    match command {
        Command::CheckConfig => check_config(config_path),
        Command::Sync {
            stage,
            dry_run,
            json,
        } => {
            let config = SyncConfig::load(config_path).context("invalid configuration")?;
            let db = open_store(&config).await?;
            let agent = SyncAgent::new(config, db)?;
            if dry_run {
                return dry_run_erp(&agent, stage).await;
            }
            let report = agent.run_cycle(stage).await;
            print_cycle(&report, json)?;
            Ok(report.exit_code())
        }
        other => {
            // Reports only need the store; API secrets may be absent.
            let config = SyncConfig::load_unvalidated(config_path)?;
            let db = open_store(&config).await?;
            let code = report(&db, other).await?;
            db.close().await;
            Ok(code)
        }
    }
}

async fn open_store(config: &SyncConfig) -> anyhow::Result<Database> {
    let path = config.store.resolved_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    info!(?path, "Opening store");
    let db = Database::new(DbConfig::new(&path).max_connections(config.store.max_connections))
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(db)
}

// =============================================================================
// Sync
// =============================================================================

async fn dry_run_erp(agent: &SyncAgent, stage: Option<SyncStage>) -> anyhow::Result<i32> {
    if stage != Some(SyncStage::Erp) {
        bail!("--dry-run is only supported with --stage erp");
    }

    let scan = agent.scan_erp().await?;
    println!("{:<40} {:>10}", "SKU", StockSource::Erp.as_str());
    for (sku, quantity) in scan.quantities.iter() {
        println!("{sku:<40} {quantity:>10}");
    }
    println!();
    println!(
        "{} products, {} SKUs, {} units, {} without SKU, stopped: {:?}",
        scan.products_seen,
        scan.quantities.len(),
        scan.quantities.units(),
        scan.missing_sku,
        scan.stop
    );
    for sku in &scan.missing_quantity {
        println!("  no stock balance reported: {sku}");
    }

    Ok(if scan.is_complete() { 0 } else { 2 })
}

fn print_cycle(report: &CycleReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{:<12} {:<10} {:>8} {:>8} {:>8} {:>8} {:>7}",
        "stage", "outcome", "checked", "inserted", "updated", "skipped", "errors"
    );
    for stage in &report.stages {
        println!(
            "{:<12} {:<10} {:>8} {:>8} {:>8} {:>8} {:>7}",
            stage.stage.as_str(),
            stage.outcome.as_str(),
            stage.checked,
            stage.inserted,
            stage.updated,
            stage.skipped,
            stage.errors.len()
        );
        if let Some(message) = &stage.message {
            println!("  {message}");
        }
        for row in stage.errors.iter().take(10) {
            println!("  {row}");
        }
        if stage.errors.len() > 10 {
            println!("  … {} more", stage.errors.len() - 10);
        }
    }
    if let Some(reason) = &report.aborted {
        println!("aborted: {reason}");
    }
    Ok(())
}

// =============================================================================
// Reports
// =============================================================================

async fn report(db: &Database, command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Summary => {
            let stock = db.stock().summary().await?;
            println!("SKUs:        {}", stock.sku_count);
            println!("Units:       {}", stock.total_units);
            println!("Zero stock:  {}", stock.zero_stock);
            for (source, units) in &stock.units_by_source {
                println!("  {source:<12} {units}");
            }

            let window = SalesWindow::current_month(Utc::now());
            let sales = db.sales_ledger().totals_since(window.from).await?;
            println!();
            println!("Sales since {}", window.from.format("%Y-%m-%d"));
            println!("Orders:      {}", sales.orders);
            println!("Units:       {}", sales.units);
            println!("Gross:       {}", sales.gross_revenue);
            println!("Net:         {}", sales.net_revenue);
            println!("Profit:      {}", sales.profit);
            if sales.cost_unknown > 0 {
                println!("  {} orders without a purchase cost", sales.cost_unknown);
            }
        }
        Command::LowStock { limit, rows } => {
            print!("{}", render::stock_table(&db.stock().low_stock(limit, rows).await?));
        }
        Command::Search { pattern, limit } => {
            print!("{}", render::stock_table(&db.stock().search(&pattern, limit).await?));
        }
        Command::Show { sku } => match db.stock().get(sku.trim()).await? {
            Some(record) => print!("{}", render::stock_detail(&record)),
            None => bail!("unknown SKU {}", sku.trim()),
        },
        Command::Export { csv, output } => {
            let records = db.stock().all().await?;
            let body = if csv {
                render::stock_csv(&records)?
            } else {
                render::stock_json(&records)?
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, body)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), records = records.len(), "Stock exported");
                }
                None => print!("{body}"),
            }
        }
        Command::History { sku, days } => {
            let since = Utc::now() - Duration::days(days.max(0));
            let entries = db.history().for_sku(sku.trim(), since).await?;
            if entries.is_empty() {
                println!("no history for {} in the last {days} days", sku.trim());
            }
            for entry in entries {
                println!(
                    "{}  {:<12} {:>8}",
                    entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.source.as_str(),
                    entry.quantity
                );
            }
        }
        Command::Runs { limit } => {
            for run in db.sync_runs().recent(limit).await? {
                println!(
                    "{}  {:<12} {:<10} checked={} inserted={} updated={} skipped={} errors={}",
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.stage.as_str(),
                    run.outcome.as_str(),
                    run.checked,
                    run.inserted,
                    run.updated,
                    run.skipped,
                    run.errors
                );
            }
        }
        Command::SetCost { sku, amount } => {
            let sku = sku.trim();
            validate_sku(sku)?;
            let cost = if amount.trim().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(Money::parse(&amount)?)
            };
            if db.stock().get(sku).await?.is_none() {
                bail!("unknown SKU {sku}");
            }
            db.stock().set_purchase_cost(sku, cost).await?;
            match cost {
                Some(cost) => println!("{sku}: purchase cost set to {cost}"),
                None => println!("{sku}: purchase cost cleared"),
            }
        }
        Command::Sync { .. } | Command::CheckConfig => bail!("not a report command"),
    }
    Ok(0)
}

// =============================================================================
// Config check
// =============================================================================

fn check_config(config_path: Option<PathBuf>) -> anyhow::Result<i32> {
    let config = SyncConfig::load_unvalidated(config_path)?;

    println!("store: {}", config.store.resolved_path().display());
    println!(
        "stages: fulfillment={} erp={} sales={}",
        config.marketplace.enabled, config.erp.enabled, config.sales.enabled
    );

    let mut missing = false;
    for secret in config.secret_report() {
        let state = match (&secret.preview, secret.required) {
            (Some(preview), _) => format!("present ({preview})"),
            (None, true) => {
                missing = true;
                "MISSING".to_string()
            }
            (None, false) => "not set (stage disabled)".to_string(),
        };
        println!("{:<28} {state}", secret.name);
    }

    match config.validate() {
        Ok(()) if !missing => {
            println!("configuration OK");
            Ok(0)
        }
        Ok(()) => Ok(1),
        Err(err) => {
            println!("configuration invalid: {err}");
            Ok(1)
        }
    }
}
