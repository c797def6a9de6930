//! # Sync Run Repository
//!
//! One row per stage per cycle: counts, outcome and a short message.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{SyncRun, SyncStage};

const SELECT_RUN: &str = r#"
    SELECT id, stage, started_at, finished_at, checked, updated, inserted,
           skipped, errors, outcome, message
    FROM sync_runs
"#;

/// Repository for the `sync_runs` table.
#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    pool: SqlitePool,
}

impl SyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncRunRepository { pool }
    }

    pub async fn record(&self, run: &SyncRun) -> DbResult<()> {
        debug!(id = %run.id, stage = %run.stage, outcome = ?run.outcome, "Recording sync run");

        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, stage, started_at, finished_at, checked, updated,
                inserted, skipped, errors, outcome, message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&run.id)
        .bind(run.stage)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.checked)
        .bind(run.updated)
        .bind(run.inserted)
        .bind(run.skipped)
        .bind(run.errors)
        .bind(run.outcome)
        .bind(&run.message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<SyncRun>> {
        let runs = sqlx::query_as::<_, SyncRun>(&format!(
            "{SELECT_RUN} ORDER BY started_at DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }

    pub async fn last_for_stage(&self, stage: SyncStage) -> DbResult<Option<SyncRun>> {
        let run = sqlx::query_as::<_, SyncRun>(&format!(
            "{SELECT_RUN} WHERE stage = ?1 ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(stage)
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::{Duration, Utc};
    use tally_core::RunOutcome;

    fn run(stage: SyncStage, outcome: RunOutcome, minutes_ago: i64) -> SyncRun {
        let started_at = Utc::now() - Duration::minutes(minutes_ago);
        SyncRun {
            id: uuid::Uuid::new_v4().to_string(),
            stage,
            started_at,
            finished_at: started_at + Duration::seconds(12),
            checked: 10,
            updated: 2,
            inserted: 1,
            skipped: 0,
            errors: 0,
            outcome,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_record_and_recent() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().sync_runs();

        repo.record(&run(SyncStage::Fulfillment, RunOutcome::Succeeded, 30))
            .await
            .unwrap();
        repo.record(&run(SyncStage::Erp, RunOutcome::Partial, 20))
            .await
            .unwrap();
        repo.record(&run(SyncStage::Sales, RunOutcome::Failed, 10))
            .await
            .unwrap();

        let recent = repo.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].stage, SyncStage::Sales);
        assert_eq!(recent[0].outcome, RunOutcome::Failed);

        let erp = repo.last_for_stage(SyncStage::Erp).await.unwrap().unwrap();
        assert_eq!(erp.outcome, RunOutcome::Partial);
        assert_eq!(erp.checked, 10);
    }
}
