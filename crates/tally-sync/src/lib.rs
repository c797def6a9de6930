//! # tally-sync: Fetch, Reconcile and Sales Engine
//!
//! Pulls stock and orders from the marketplace and the ERP, reconciles
//! stock into the local store and prices orders into the sales ledger.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Cycle Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncAgent (one cycle per call)                   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  sources       │  │  sources       │  │  SalesPipeline         │    │
//! │  │  fulfillment   │  │  erp           │  │                        │    │
//! │  │  (fan-out)     │  │  (direct)      │  │  orders → breakdown →  │    │
//! │  └───────┬────────┘  └───────┬────────┘  │  ledger                │    │
//! │          │                   │           └────────────────────────┘    │
//! │          ▼                   ▼                                          │
//! │  ┌──────────────────────────────────────┐  ┌────────────────────────┐  │
//! │  │  ReconciliationEngine                │  │  HistoryWriter         │  │
//! │  │  insert / update / unchanged per SKU │─►│  append-only snapshots │  │
//! │  └──────────────────────────────────────┘  └────────────────────────┘  │
//! │                                                                         │
//! │  Every HTTP call: ApiClient → RetryPolicy (429 backoff) → Paginator    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - `SyncAgent` cycle orchestrator and reports
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//! - [`fetcher`] - Retry policy and paginator
//! - [`auth`] - Token providers
//! - [`http`] - Authenticated JSON client
//! - [`marketplace`] - Marketplace endpoints and payloads
//! - [`erp`] - ERP endpoints and payloads
//! - [`sources`] - Per-source scans feeding the aggregator
//! - [`reconcile`] - Stock reconciliation engine
//! - [`sales`] - Sales financial pipeline
//! - [`audit`] - Stock history writer
//! - [`store`] - Store boundary traits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_sync::{SyncAgent, SyncConfig};
//! use tally_db::{Database, DbConfig};
//!
//! let config = SyncConfig::load(None)?;
//! let db = Database::new(DbConfig::new(config.store.resolved_path())).await?;
//!
//! let agent = SyncAgent::new(config, db)?;
//! let report = agent.run_cycle(None).await;
//! std::process::exit(report.exit_code());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod error;

// Fetching
pub mod auth;
pub mod erp;
pub mod fetcher;
pub mod http;
pub mod marketplace;

// Engines
pub mod audit;
pub mod reconcile;
pub mod sales;
pub mod sources;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{CycleReport, StageReport, SyncAgent};
pub use config::{SecretStatus, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use fetcher::{FetchOutcome, Page, PageCursor, Paginator, RetryPolicy, StopReason};
pub use sources::{ErpScan, FulfillmentScan};
