//! # tally-core: Pure Reconciliation Logic
//!
//! Everything that decides a number lives here, as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/tally-runner (CLI, cron)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │         tally-sync (HTTP fetchers, engines, cycle)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ aggregate │  │ reconcile │  │ financial │  │   money   │  │   │
//! │  │   │  fan-out  │  │  insert/  │  │ margin,   │  │  cents    │  │   │
//! │  │   │  direct   │  │  update   │  │ tax, ctl  │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               tally-db (SQLite repositories)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (StockRecord, OrderLine, summaries)
//! - [`aggregate`] - Per-SKU aggregation for fan-out and direct sources
//! - [`reconcile`] - Insert / update / unchanged decision per SKU
//! - [`financial`] - Order line revenue, cost and margin
//! - [`money`] - Integer-cent money type
//! - [`validation`] - SKU, status and quantity normalisation
//! - [`error`] - Domain error types

pub mod aggregate;
pub mod error;
pub mod financial;
pub mod money;
pub mod reconcile;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

/// Status stored for orders that arrive without one.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Longest SKU accepted from an operator.
pub const MAX_SKU_LENGTH: usize = 60;
