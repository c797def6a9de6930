//! # Tally Runner
//!
//! Command-line entry point: runs one sync cycle per invocation and answers
//! reporting queries against the local store.
//!
//! ## Startup Sequence
//! 1. Parse arguments
//! 2. Initialize tracing (`RUST_LOG`, optional JSON)
//! 3. Load configuration (defaults → `tally.toml` → `TALLY_*` env)
//! 4. Open the SQLite store and apply migrations
//! 5. Dispatch the subcommand
//!
//! ## Exit Codes
//! - `0` every stage succeeded or was skipped
//! - `1` the cycle was aborted, or the command itself failed
//! - `2` at least one stage failed or finished partially

mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use tally_core::SyncStage;

#[derive(Debug, Parser)]
#[command(name = "tally-runner", version, about = "Marketplace and ERP stock reconciliation")]
struct Cli {
    /// Path to tally.toml
    #[arg(long, global = true, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run one sync cycle
    Sync {
        /// Only run this stage (stock, erp, sales)
        #[arg(long)]
        stage: Option<SyncStage>,

        /// Fetch and aggregate without writing (ERP stage only)
        #[arg(long, requires = "stage")]
        dry_run: bool,

        /// Print the cycle report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stock totals and this month's sales
    Summary,

    /// SKUs whose total is at or below a threshold
    LowStock {
        #[arg(long, default_value_t = 5)]
        limit: i64,

        /// Maximum rows to print
        #[arg(long, default_value_t = 50)]
        rows: u32,
    },

    /// Every stored field for one SKU
    Show { sku: String },

    /// Dump the stock table (JSON unless --csv)
    Export {
        #[arg(long)]
        csv: bool,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Recorded quantities for one SKU
    History {
        sku: String,

        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// Recent sync runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// SKUs matching a pattern
    Search {
        pattern: String,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// Set or clear a SKU's purchase unit cost
    SetCost {
        sku: String,

        /// Decimal amount; `none` clears the cost
        amount: String,
    },

    /// Validate configuration and report secrets
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let code = match commands::dispatch(cli.config, cli.command).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("error: {err:#}");
            1
        }
    };

    std::process::exit(code);
}

/// Initializes the tracing subscriber once for the process.
///
/// `RUST_LOG` wins over the default `info,tally=debug,sqlx=warn` filter.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_stage_aliases() {
        let cli = Cli::try_parse_from(["tally-runner", "sync", "--stage", "stock"]).unwrap();
        match cli.command {
            Command::Sync { stage, dry_run, .. } => {
                assert_eq!(stage, Some(SyncStage::Fulfillment));
                assert!(!dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_dry_run_requires_stage() {
        assert!(Cli::try_parse_from(["tally-runner", "sync", "--dry-run"]).is_err());
        assert!(
            Cli::try_parse_from(["tally-runner", "sync", "--stage", "erp", "--dry-run"]).is_ok()
        );
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert!(Cli::try_parse_from(["tally-runner", "sync", "--stage", "payments"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["tally-runner", "runs", "--config", "/etc/tally.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/tally.toml")));
        assert!(matches!(cli.command, Command::Runs { limit: 20 }));
    }

    #[test]
    fn test_set_cost_arguments() {
        let cli = Cli::try_parse_from(["tally-runner", "set-cost", "CAP-001", "12,50"]).unwrap();
        match cli.command {
            Command::SetCost { sku, amount } => {
                assert_eq!(sku, "CAP-001");
                assert_eq!(amount, "12,50");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_show_and_export_arguments() {
        let cli = Cli::try_parse_from(["tally-runner", "show", "CAP-001"]).unwrap();
        assert!(matches!(cli.command, Command::Show { ref sku } if sku == "CAP-001"));

        let cli =
            Cli::try_parse_from(["tally-runner", "export", "--csv", "-o", "stock.csv"]).unwrap();
        match cli.command {
            Command::Export { csv, output } => {
                assert!(csv);
                assert_eq!(output, Some(PathBuf::from("stock.csv")));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["tally-runner", "export"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Export {
                csv: false,
                output: None
            }
        ));
    }
}
