//! # tally-db: Database Layer for Tally
//!
//! SQLite storage for reconciled stock, the sales ledger, the stock audit
//! trail and the sync run log.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Data Flow                                │
//! │                                                                         │
//! │  tally-sync (ReconciliationEngine, SalesPipeline, HistoryWriter)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ Stock, Ledger  │    │  (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │ History, Runs  │    │ 001_init.sql │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally.db (path from [store] in tally.toml)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//! let snapshot = db.stock().all().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::history::StockHistoryRepository;
pub use repository::ledger::{LedgerEntry, SalesLedgerRepository, SalesTotals};
pub use repository::runs::SyncRunRepository;
pub use repository::stock::{StockRepository, StockSnapshot, StockSummary};
