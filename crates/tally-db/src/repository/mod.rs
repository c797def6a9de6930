//! # Repository Module
//!
//! One repository per table, each a thin handle over the shared pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tally-sync                                                             │
//! │       │                                                                 │
//! │       │  db.stock().snapshot()     → read-before-write snapshot        │
//! │       │  db.stock().insert(..)     → new SKU                           │
//! │       │  db.sales_ledger().insert  → one immutable row per order       │
//! │       │  db.history().append_batch → per-cycle audit snapshot          │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`StockRepository`](stock::StockRepository) - per-SKU quantities and costs
//! - [`SalesLedgerRepository`](ledger::SalesLedgerRepository) - order ledger
//! - [`StockHistoryRepository`](history::StockHistoryRepository) - audit trail
//! - [`SyncRunRepository`](runs::SyncRunRepository) - cycle log

pub mod history;
pub mod ledger;
pub mod runs;
pub mod stock;
