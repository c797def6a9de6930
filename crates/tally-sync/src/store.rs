//! # Store Boundary
//!
//! The keyed-record operations the engines need, as traits. `Database`
//! implements all of them over SQLite; tests substitute in-memory doubles.
//!
//! ```text
//! ReconciliationEngine ──► StockStore     (snapshot / insert / update)
//! SalesPipeline        ──► OrderLedger    (known_ids / contains / insert)
//!                      ──► CostCatalog    (purchase cost snapshot)
//! HistoryWriter        ──► HistoryLedger  (append)
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::error::SyncResult;
use tally_core::{OrderLine, SourceQuantities, StockRecord, SyncHistoryEntry};
use tally_db::{Database, StockSnapshot};

#[async_trait]
pub trait StockStore: Send + Sync {
    /// Every stored record. Rows that cannot be decoded are returned in
    /// `unreadable` rather than failing the load.
    async fn snapshot(&self) -> SyncResult<StockSnapshot>;

    async fn insert(&self, record: &StockRecord) -> SyncResult<()>;

    async fn update(
        &self,
        sku: &str,
        source_quantities: &SourceQuantities,
        total: i64,
        updated_at: DateTime<Utc>,
    ) -> SyncResult<()>;
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn known_ids(&self) -> SyncResult<HashSet<String>>;

    async fn contains(&self, order_id: &str) -> SyncResult<bool>;

    /// Returns `false` when the order was already present.
    async fn insert(&self, line: &OrderLine) -> SyncResult<bool>;
}

#[async_trait]
pub trait HistoryLedger: Send + Sync {
    async fn append(&self, entries: &[SyncHistoryEntry]) -> SyncResult<usize>;
}

/// Purchase unit cost per SKU, in currency units.
#[async_trait]
pub trait CostCatalog: Send + Sync {
    async fn purchase_costs(&self) -> SyncResult<HashMap<String, f64>>;
}

// =============================================================================
// SQLite
// =============================================================================

#[async_trait]
impl StockStore for Database {
    async fn snapshot(&self) -> SyncResult<StockSnapshot> {
        Ok(self.stock().snapshot().await?)
    }

    async fn insert(&self, record: &StockRecord) -> SyncResult<()> {
        Ok(self.stock().insert(record).await?)
    }

    async fn update(
        &self,
        sku: &str,
        source_quantities: &SourceQuantities,
        total: i64,
        updated_at: DateTime<Utc>,
    ) -> SyncResult<()> {
        Ok(self
            .stock()
            .update_quantities(sku, source_quantities, total, updated_at)
            .await?)
    }
}

#[async_trait]
impl OrderLedger for Database {
    async fn known_ids(&self) -> SyncResult<HashSet<String>> {
        Ok(self.sales_ledger().order_ids().await?)
    }

    async fn contains(&self, order_id: &str) -> SyncResult<bool> {
        Ok(self.sales_ledger().contains(order_id).await?)
    }

    async fn insert(&self, line: &OrderLine) -> SyncResult<bool> {
        Ok(self.sales_ledger().insert(line).await?)
    }
}

#[async_trait]
impl HistoryLedger for Database {
    async fn append(&self, entries: &[SyncHistoryEntry]) -> SyncResult<usize> {
        Ok(self.history().append_batch(entries).await?)
    }
}

#[async_trait]
impl CostCatalog for Database {
    async fn purchase_costs(&self) -> SyncResult<HashMap<String, f64>> {
        let costs = self.stock().purchase_costs().await?;
        Ok(costs
            .into_iter()
            .map(|(sku, cost)| (sku, cost.to_decimal()))
            .collect())
    }
}
