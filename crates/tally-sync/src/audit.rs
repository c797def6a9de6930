//! # History Writer
//!
//! Appends one snapshot row per SKU for each reconciled source. The
//! history is an audit trail: a failed append is logged and dropped, it
//! never fails the stage that produced the quantities.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::store::HistoryLedger;
use tally_core::{SourceQuantityMap, SyncHistoryEntry};

pub struct HistoryWriter<'a, H: ?Sized> {
    ledger: &'a H,
    last_recorded: Option<DateTime<Utc>>,
}

impl<'a, H: HistoryLedger + ?Sized> HistoryWriter<'a, H> {
    pub fn new(ledger: &'a H) -> Self {
        HistoryWriter {
            ledger,
            last_recorded: None,
        }
    }

    /// Appends the batch for one source. Returns the rows written.
    pub async fn record(&mut self, quantities: &SourceQuantityMap) -> usize {
        if quantities.is_empty() {
            return 0;
        }

        let recorded_at = self.next_timestamp();
        let source = quantities.source();
        let entries: Vec<SyncHistoryEntry> = quantities
            .iter()
            .map(|(sku, quantity)| SyncHistoryEntry {
                sku: sku.to_string(),
                source,
                quantity,
                recorded_at,
            })
            .collect();

        match self.ledger.append(&entries).await {
            Ok(written) => {
                info!(source = %source, rows = written, "History batch appended");
                written
            }
            Err(e) => {
                warn!(source = %source, rows = entries.len(), error = %e, "History append failed");
                0
            }
        }
    }

    /// `now`, nudged forward so batches never share or reverse a timestamp.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_recorded {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_recorded = Some(at);
        at
    }
}
