//! # Stock Repository
//!
//! Persistence for `StockRecord`, one row per SKU.
//!
//! ## Row Layout
//! ```text
//! ┌──────────┬──────────────────────────────────────────┬───────┬──────────┐
//! │ sku      │ source_quantities (JSON)                 │ total │ cost ¢   │
//! ├──────────┼──────────────────────────────────────────┼───────┼──────────┤
//! │ CAP-001  │ {"erp":4,"fulfillment":3,"marketplace":0}│   7   │ 1000     │
//! │ CAP-002  │ {"erp":0,"fulfillment":2,"legacy":1}     │   3   │ NULL     │
//! └──────────┴──────────────────────────────────────────┴───────┴──────────┘
//! ```
//!
//! Quantities are only ever written through `insert` and
//! `update_quantities`, both driven by the reconciliation engine. The
//! purchase cost column is owned by `set_purchase_cost`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use tally_core::{Money, RowError, SourceQuantities, StockRecord};

/// Raw `stock` row.
#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    sku: String,
    source_quantities: String,
    total: i64,
    purchase_unit_cost_cents: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StockRow {
    fn into_record(self) -> DbResult<StockRecord> {
        let source_quantities: SourceQuantities = serde_json::from_str(&self.source_quantities)
            .map_err(|e| DbError::invalid_data("Stock", &self.sku, e.to_string()))?;

        Ok(StockRecord {
            sku: self.sku,
            source_quantities,
            total: self.total,
            purchase_unit_cost: self.purchase_unit_cost_cents.map(Money::from_cents),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Every stock row, split into decoded records and rows that failed to
/// decode.
#[derive(Debug, Clone, Default)]
pub struct StockSnapshot {
    pub records: Vec<StockRecord>,
    /// One entry per undecodable row, keyed by SKU.
    pub unreadable: Vec<RowError>,
}

/// Aggregate figures for the stock table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockSummary {
    pub sku_count: i64,
    pub total_units: i64,
    pub zero_stock: i64,
    /// Units per source key across all SKUs.
    pub units_by_source: BTreeMap<String, i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    sku_count: i64,
    total_units: i64,
    zero_stock: i64,
}

const SELECT_STOCK: &str = r#"
    SELECT sku, source_quantities, total, purchase_unit_cost_cents, created_at, updated_at
    FROM stock
"#;

/// Repository for the `stock` table.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Loads every record, ordered by SKU.
    ///
    /// ## Errors
    /// `DbError::InvalidData` if any row fails to decode.
    pub async fn all(&self) -> DbResult<Vec<StockRecord>> {
        let rows: Vec<StockRow> = sqlx::query_as(&format!("{SELECT_STOCK} ORDER BY sku"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StockRow::into_record).collect()
    }

    /// Loads every row, decoding each one on its own.
    ///
    /// Used once per reconciliation as the read-before-write snapshot. A
    /// row that fails to decode lands in `unreadable` instead of failing
    /// the whole load.
    pub async fn snapshot(&self) -> DbResult<StockSnapshot> {
        let rows: Vec<StockRow> = sqlx::query_as(&format!("{SELECT_STOCK} ORDER BY sku"))
            .fetch_all(&self.pool)
            .await?;

        let mut snapshot = StockSnapshot::default();
        for row in rows {
            let sku = row.sku.clone();
            match row.into_record() {
                Ok(record) => snapshot.records.push(record),
                Err(e) => {
                    warn!(sku = %sku, error = %e, "Unreadable stock row");
                    snapshot.unreadable.push(RowError::new(sku, e.to_string()));
                }
            }
        }

        debug!(
            count = snapshot.records.len(),
            unreadable = snapshot.unreadable.len(),
            "Loaded stock snapshot"
        );
        Ok(snapshot)
    }

    /// Gets one record by SKU.
    pub async fn get(&self, sku: &str) -> DbResult<Option<StockRecord>> {
        let row: Option<StockRow> = sqlx::query_as(&format!("{SELECT_STOCK} WHERE sku = ?1"))
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        row.map(StockRow::into_record).transpose()
    }

    /// Inserts a new record.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the SKU appeared since the snapshot.
    pub async fn insert(&self, record: &StockRecord) -> DbResult<()> {
        let quantities = encode_quantities(&record.sku, &record.source_quantities)?;

        debug!(sku = %record.sku, total = record.total, "Inserting stock record");

        sqlx::query(
            r#"
            INSERT INTO stock (
                sku, source_quantities, total, purchase_unit_cost_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.sku)
        .bind(quantities)
        .bind(record.total)
        .bind(record.purchase_unit_cost)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces the per-source quantities and total of an existing record.
    ///
    /// ## Errors
    /// `DbError::NotFound` if no row has this SKU.
    pub async fn update_quantities(
        &self,
        sku: &str,
        source_quantities: &SourceQuantities,
        total: i64,
        updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let quantities = encode_quantities(sku, source_quantities)?;

        debug!(sku = %sku, total = total, "Updating stock quantities");

        let result = sqlx::query(
            r#"
            UPDATE stock SET
                source_quantities = ?2,
                total = ?3,
                updated_at = ?4
            WHERE sku = ?1
            "#,
        )
        .bind(sku)
        .bind(quantities)
        .bind(total)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Stock", sku));
        }
        Ok(())
    }

    /// Sets or clears a SKU's purchase unit cost.
    pub async fn set_purchase_cost(&self, sku: &str, cost: Option<Money>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE stock SET purchase_unit_cost_cents = ?2, updated_at = ?3 WHERE sku = ?1",
        )
        .bind(sku)
        .bind(cost)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Stock", sku));
        }
        Ok(())
    }

    /// SKU → purchase unit cost, for SKUs that have one.
    pub async fn purchase_costs(&self) -> DbResult<HashMap<String, Money>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sku, purchase_unit_cost_cents FROM stock WHERE purchase_unit_cost_cents IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(sku, cents)| (sku, Money::from_cents(cents)))
            .collect())
    }

    /// Records with `total <= threshold`, lowest first.
    pub async fn low_stock(&self, threshold: i64, limit: u32) -> DbResult<Vec<StockRecord>> {
        let rows: Vec<StockRow> = sqlx::query_as(&format!(
            "{SELECT_STOCK} WHERE total <= ?1 ORDER BY total ASC, sku ASC LIMIT ?2"
        ))
        .bind(threshold)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StockRow::into_record).collect()
    }

    /// SKUs containing `pattern`, case-insensitive for ASCII.
    pub async fn search(&self, pattern: &str, limit: u32) -> DbResult<Vec<StockRecord>> {
        let like = format!("%{}%", pattern.trim());
        let rows: Vec<StockRow> = sqlx::query_as(&format!(
            "{SELECT_STOCK} WHERE sku LIKE ?1 ORDER BY sku LIMIT ?2"
        ))
        .bind(like)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StockRow::into_record).collect()
    }

    /// Totals across the whole table.
    pub async fn summary(&self) -> DbResult<StockSummary> {
        let row: SummaryRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS sku_count,
                COALESCE(SUM(total), 0) AS total_units,
                COALESCE(SUM(CASE WHEN total = 0 THEN 1 ELSE 0 END), 0) AS zero_stock
            FROM stock
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let by_source: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT q.key AS source, COALESCE(SUM(q.value), 0) AS units
            FROM stock, json_each(stock.source_quantities) AS q
            GROUP BY q.key
            ORDER BY q.key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(StockSummary {
            sku_count: row.sku_count,
            total_units: row.total_units,
            zero_stock: row.zero_stock,
            units_by_source: by_source.into_iter().collect(),
        })
    }
}

fn encode_quantities(sku: &str, quantities: &SourceQuantities) -> DbResult<String> {
    serde_json::to_string(quantities).map_err(|e| DbError::invalid_data("Stock", sku, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use tally_core::reconcile::new_record;
    use tally_core::StockSource;

    async fn repo() -> StockRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stock()
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let repo = repo().await;
        let record = new_record("CAP-001", StockSource::Erp, 4, Utc::now());
        repo.insert(&record).await.unwrap();

        let loaded = repo.get("CAP-001").await.unwrap().unwrap();
        assert_eq!(loaded.total, 4);
        assert_eq!(loaded.quantity_of(StockSource::Erp), 4);
        assert_eq!(loaded.source_quantities.len(), 3);
        assert!(loaded.purchase_unit_cost.is_none());

        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_unique_violation() {
        let repo = repo().await;
        let record = new_record("CAP-001", StockSource::Erp, 4, Utc::now());
        repo.insert(&record).await.unwrap();

        let err = repo.insert(&record).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_quantities() {
        let repo = repo().await;
        repo.insert(&new_record("CAP-001", StockSource::Erp, 4, Utc::now()))
            .await
            .unwrap();

        let mut quantities = SourceQuantities::new();
        quantities.insert("erp".to_string(), 4);
        quantities.insert("fulfillment".to_string(), 6);
        repo.update_quantities("CAP-001", &quantities, 10, Utc::now())
            .await
            .unwrap();

        let loaded = repo.get("CAP-001").await.unwrap().unwrap();
        assert_eq!(loaded.total, 10);
        assert!(loaded.check_total().is_ok());

        let err = repo
            .update_quantities("missing", &quantities, 10, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_purchase_costs() {
        let repo = repo().await;
        repo.insert(&new_record("CAP-001", StockSource::Erp, 4, Utc::now()))
            .await
            .unwrap();
        repo.insert(&new_record("CAP-002", StockSource::Erp, 1, Utc::now()))
            .await
            .unwrap();

        repo.set_purchase_cost("CAP-001", Some(Money::from_cents(1250)))
            .await
            .unwrap();
        assert!(repo
            .set_purchase_cost("missing", Some(Money::from_cents(1)))
            .await
            .is_err());

        let costs = repo.purchase_costs().await.unwrap();
        assert_eq!(costs.len(), 1);
        assert_eq!(costs["CAP-001"].cents(), 1250);
    }

    #[tokio::test]
    async fn test_low_stock_search_and_summary() {
        let repo = repo().await;
        for (sku, qty) in [("CAP-001", 0), ("CAP-002", 2), ("MUG-001", 9)] {
            repo.insert(&new_record(sku, StockSource::Erp, qty, Utc::now()))
                .await
                .unwrap();
        }

        let low = repo.low_stock(2, 10).await.unwrap();
        let skus: Vec<_> = low.iter().map(|r| r.sku.as_str()).collect();
        assert_eq!(skus, vec!["CAP-001", "CAP-002"]);

        let caps = repo.search("cap", 10).await.unwrap();
        assert_eq!(caps.len(), 2);

        let summary = repo.summary().await.unwrap();
        assert_eq!(summary.sku_count, 3);
        assert_eq!(summary.total_units, 11);
        assert_eq!(summary.zero_stock, 1);
        assert_eq!(summary.units_by_source["erp"], 11);
        assert_eq!(summary.units_by_source["fulfillment"], 0);
    }

    #[tokio::test]
    async fn test_corrupt_quantities_are_reported() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO stock (sku, source_quantities, total, created_at, updated_at) VALUES ('BAD', 'not json', 0, ?1, ?1)",
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let err = db.stock().all().await.unwrap_err();
        assert!(matches!(err, DbError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_sets_aside_undecodable_rows() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stock()
            .insert(&new_record("CAP-001", StockSource::Erp, 4, Utc::now()))
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO stock (sku, source_quantities, total, created_at, updated_at) VALUES ('BAD', '{\"erp\": 1.5}', 1, ?1, ?1)",
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let snapshot = db.stock().snapshot().await.unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].sku, "CAP-001");
        assert_eq!(snapshot.unreadable.len(), 1);
        assert_eq!(snapshot.unreadable[0].key, "BAD");
        assert!(snapshot.unreadable[0].reason.contains("Invalid stored data"));
    }
}
