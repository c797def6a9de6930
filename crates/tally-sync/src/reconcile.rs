//! # Reconciliation Engine
//!
//! Applies one source's `SourceQuantityMap` to the stock table.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  snapshot() ── store unreachable ──► Err(StoreUnavailable)           │
//! │      │                                                                  │
//! │      ├─ unreadable rows ──► RowError each, SKU left untouched          │
//! │      ▼  records: sku → StockRecord                                     │
//! │  for (sku, qty) in map:                                                │
//! │      decide(snapshot[sku], sku, source, qty)                           │
//! │        Insert    → store.insert      ─┐                                │
//! │        Update    → store.update      ─┼─ failure → RowError, continue  │
//! │        Unchanged → (no write)         │                                │
//! │                                       ▼                                │
//! │                               ReconcileSummary                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::store::StockStore;
use tally_core::reconcile::{decide, UpsertDecision};
use tally_core::validation::validate_sku;
use tally_core::{ReconcileSummary, RowError, SourceQuantityMap, StockRecord};

pub struct ReconciliationEngine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: StockStore + ?Sized> ReconciliationEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        ReconciliationEngine { store }
    }

    /// Merges `quantities` into the persisted records.
    ///
    /// ## Returns
    /// * `Ok(summary)` - Per-SKU outcome, row failures included
    /// * `Err(SyncError::StoreUnavailable)` - The store could not be reached
    /// * `Err(SyncError::Database)` - The snapshot query itself failed
    ///
    /// A stored row that cannot be decoded is reported as a row error and
    /// its SKU is not written this run.
    pub async fn reconcile(&self, quantities: &SourceQuantityMap) -> SyncResult<ReconcileSummary> {
        let source = quantities.source();
        let mut summary = ReconcileSummary::new(source);

        let loaded = self.store.snapshot().await?;
        let unreadable: HashSet<String> =
            loaded.unreadable.iter().map(|row| row.key.clone()).collect();
        for row in loaded.unreadable {
            warn!(sku = %row.key, reason = %row.reason, "Skipping unreadable stock row");
            summary
                .errors
                .push(RowError::new(row.key, format!("stored record unreadable: {}", row.reason)));
        }

        let snapshot: HashMap<String, StockRecord> = loaded
            .records
            .into_iter()
            .map(|record| (record.sku.clone(), record))
            .collect();

        debug!(source = %source, stored = snapshot.len(), incoming = quantities.len(), "Reconciling");

        for (sku, quantity) in quantities.iter() {
            summary.checked += 1;

            if unreadable.contains(sku) {
                continue;
            }

            if let Err(e) = validate_sku(sku) {
                summary.errors.push(RowError::new(sku, e.to_string()));
                continue;
            }

            let now = Utc::now();
            match decide(snapshot.get(sku), sku, source, quantity, now) {
                UpsertDecision::Unchanged => summary.unchanged += 1,
                UpsertDecision::Insert(record) => match self.store.insert(&record).await {
                    Ok(()) => {
                        debug!(sku = %sku, total = record.total, "Inserted stock record");
                        summary.inserted += 1;
                    }
                    Err(e) => {
                        warn!(sku = %sku, error = %e, "Stock insert failed");
                        summary.errors.push(write_failure(sku, e));
                    }
                },
                UpsertDecision::Update {
                    sku: key,
                    source_quantities,
                    total,
                    previous,
                } => match self
                    .store
                    .update(&key, &source_quantities, total, now)
                    .await
                {
                    Ok(()) => {
                        debug!(sku = %key, previous, quantity, total, "Updated stock record");
                        summary.updated += 1;
                    }
                    Err(e) => {
                        warn!(sku = %key, error = %e, "Stock update failed");
                        summary.errors.push(write_failure(&key, e));
                    }
                },
            }
        }

        info!(
            source = %source,
            checked = summary.checked,
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            errors = summary.errors.len(),
            "Reconciliation finished"
        );

        Ok(summary)
    }
}

fn write_failure(sku: &str, err: SyncError) -> RowError {
    let failure = SyncError::RowWriteFailure {
        key: sku.to_string(),
        reason: err.to_string(),
    };
    RowError::new(sku, failure.to_string())
}
