//! # Stock History Repository
//!
//! Append-only snapshots of what each source reported, one row per SKU per
//! source per cycle. Nothing here ever updates or deletes.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::SyncHistoryEntry;

/// Repository for the `stock_history` table.
#[derive(Debug, Clone)]
pub struct StockHistoryRepository {
    pool: SqlitePool,
}

impl StockHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockHistoryRepository { pool }
    }

    /// Appends a batch in a single transaction.
    ///
    /// Either the whole batch lands or none of it does.
    pub async fn append_batch(&self, entries: &[SyncHistoryEntry]) -> DbResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO stock_history (sku, source, quantity, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&entry.sku)
            .bind(entry.source)
            .bind(entry.quantity)
            .bind(entry.recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(count = entries.len(), "Appended stock history");
        Ok(entries.len())
    }

    /// Entries for one SKU recorded at or after `since`, newest first.
    pub async fn for_sku(
        &self,
        sku: &str,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<SyncHistoryEntry>> {
        let entries = sqlx::query_as::<_, SyncHistoryEntry>(
            r#"
            SELECT sku, source, quantity, recorded_at
            FROM stock_history
            WHERE sku = ?1 AND recorded_at >= ?2
            ORDER BY recorded_at DESC, id DESC
            "#,
        )
        .bind(sku)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
