//! # Sync Agent
//!
//! Runs one complete sync cycle. The interval is driven from outside
//! (cron, a systemd timer); each invocation of the runner is one cycle.
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent::run_cycle                             │
//! │                                                                         │
//! │  1. Token check   every provider the selected stages need              │
//! │                   failure ──────────────────────────► ABORT (exit 1)  │
//! │  2. Store check   SELECT 1                                             │
//! │                   failure ──────────────────────────► ABORT (exit 1)  │
//! │  3. Stages, in order, each logged to sync_runs:                        │
//! │                                                                         │
//! │     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐             │
//! │     │ fulfillment  │──►│     erp      │──►│    sales     │             │
//! │     │ scan →       │   │ scan →       │   │ orders →     │             │
//! │     │ reconcile →  │   │ reconcile →  │   │ price →      │             │
//! │     │ history      │   │ history      │   │ ledger       │             │
//! │     └──────────────┘   └──────────────┘   └──────────────┘             │
//! │                                                                         │
//! │     transport/decode failure → stage Failed, next stage runs           │
//! │     auth/store failure       → stage Failed, cycle ABORTED             │
//! │     row failures/truncation  → stage Partial (exit 2)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use tally_core::{RowError, RunOutcome, SyncRun, SyncStage};
use tally_db::Database;

use crate::audit::HistoryWriter;
use crate::auth::{RefreshTokenProvider, StaticTokenProvider, TokenProvider};
use crate::config::SyncConfig;
use crate::erp::ErpClient;
use crate::error::{SyncError, SyncResult};
use crate::http::ApiClient;
use crate::marketplace::MarketplaceClient;
use crate::reconcile::ReconciliationEngine;
use crate::sales::{SalesPipeline, SalesWindow};
use crate::sources::{scan_erp, scan_fulfillment, ErpScan};
use crate::store::CostCatalog;

// =============================================================================
// Reports
// =============================================================================

/// What one stage did.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: SyncStage,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checked: usize,
    pub updated: usize,
    pub inserted: usize,
    /// Rows left as they were (unchanged stock, already known orders).
    pub skipped: usize,
    pub errors: Vec<RowError>,
    pub message: Option<String>,
}

impl StageReport {
    fn new(stage: SyncStage, started_at: DateTime<Utc>) -> Self {
        StageReport {
            stage,
            outcome: RunOutcome::Succeeded,
            started_at,
            finished_at: started_at,
            checked: 0,
            updated: 0,
            inserted: 0,
            skipped: 0,
            errors: Vec::new(),
            message: None,
        }
    }

    fn skipped(stage: SyncStage) -> Self {
        let now = Utc::now();
        StageReport {
            outcome: RunOutcome::Skipped,
            message: Some("disabled in configuration".to_string()),
            ..StageReport::new(stage, now)
        }
    }

    fn failed(stage: SyncStage, started_at: DateTime<Utc>, err: &SyncError) -> Self {
        StageReport {
            outcome: RunOutcome::Failed,
            finished_at: Utc::now(),
            message: Some(err.to_string()),
            ..StageReport::new(stage, started_at)
        }
    }

    /// Marks the report partial when anything was lost along the way.
    fn settle(mut self, truncated: Option<String>) -> Self {
        self.finished_at = Utc::now();
        if truncated.is_some() || !self.errors.is_empty() {
            self.outcome = RunOutcome::Partial;
        }
        if truncated.is_some() {
            self.message = truncated;
        }
        self
    }

    fn to_run(&self) -> SyncRun {
        SyncRun {
            id: Uuid::new_v4().to_string(),
            stage: self.stage,
            started_at: self.started_at,
            finished_at: self.finished_at,
            checked: self.checked as i64,
            updated: self.updated as i64,
            inserted: self.inserted as i64,
            skipped: self.skipped as i64,
            errors: self.errors.len() as i64,
            outcome: self.outcome,
            message: self.message.clone(),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
    /// Set when a cycle-fatal error stopped the run.
    pub aborted: Option<String>,
}

impl CycleReport {
    fn new() -> Self {
        let now = Utc::now();
        CycleReport {
            started_at: now,
            finished_at: now,
            stages: Vec::new(),
            aborted: None,
        }
    }

    fn abort(mut self, err: &SyncError) -> Self {
        error!(error = %err, "Sync cycle aborted");
        self.aborted = Some(err.to_string());
        self.finished_at = Utc::now();
        self
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Process exit code for the runner.
    ///
    /// * `0` - Every stage succeeded or was skipped
    /// * `1` - The cycle was aborted
    /// * `2` - Completed with failed or partial stages
    pub fn exit_code(&self) -> i32 {
        if self.is_aborted() {
            return 1;
        }
        let degraded = self
            .stages
            .iter()
            .any(|s| matches!(s.outcome, RunOutcome::Failed | RunOutcome::Partial));
        if degraded {
            2
        } else {
            0
        }
    }

    pub fn stage(&self, stage: SyncStage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

// =============================================================================
// Sync Agent
// =============================================================================

const STAGE_ORDER: [SyncStage; 3] = [SyncStage::Fulfillment, SyncStage::Erp, SyncStage::Sales];

/// Runs sync cycles against one database.
pub struct SyncAgent {
    config: Arc<SyncConfig>,
    db: Database,
    marketplace: Option<MarketplaceClient>,
    marketplace_tokens: Option<Arc<dyn TokenProvider>>,
    erp: Option<ErpClient>,
    erp_tokens: Option<Arc<dyn TokenProvider>>,
}

impl SyncAgent {
    /// Builds the HTTP clients for every enabled stage.
    ///
    /// ## Errors
    /// * `SyncError::InvalidUrl` - A configured base URL does not parse
    /// * `SyncError::InvalidConfig` - The HTTP client could not be built
    pub fn new(config: SyncConfig, db: Database) -> SyncResult<Self> {
        let http = ApiClient::build_http(config.fetch.request_timeout())?;
        let policy = config.fetch.retry_policy();
        let page_delay = config.fetch.page_delay();

        let (marketplace, marketplace_tokens) = if config.marketplace.enabled || config.sales.enabled
        {
            let settings = &config.marketplace;
            let tokens: Arc<dyn TokenProvider> = Arc::new(RefreshTokenProvider::new(
                http.clone(),
                settings.token_url.clone(),
                settings.client_id.clone(),
                settings.client_secret.clone(),
                settings.refresh_token.clone(),
            ));
            let api = ApiClient::new(http.clone(), &settings.api_base, tokens.clone())?;
            let client = MarketplaceClient::new(api, settings.seller_id.clone(), policy, page_delay);
            (Some(client), Some(tokens))
        } else {
            (None, None)
        };

        let (erp, erp_tokens) = if config.erp.enabled {
            let tokens: Arc<dyn TokenProvider> =
                Arc::new(StaticTokenProvider::new(config.erp.access_token.clone()));
            let api = ApiClient::new(http, &config.erp.api_base, tokens.clone())?;
            let client = ErpClient::new(api, policy, page_delay)
                .with_loop_detection(config.fetch.loop_detection);
            (Some(client), Some(tokens))
        } else {
            (None, None)
        };

        Ok(SyncAgent {
            config: Arc::new(config),
            db,
            marketplace,
            marketplace_tokens,
            erp,
            erp_tokens,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn stage_enabled(&self, stage: SyncStage) -> bool {
        match stage {
            SyncStage::Fulfillment => self.config.marketplace.enabled,
            SyncStage::Erp => self.config.erp.enabled,
            SyncStage::Sales => self.config.sales.enabled,
        }
    }

    /// Runs every stage, or only `only`.
    pub async fn run_cycle(&self, only: Option<SyncStage>) -> CycleReport {
        let mut report = CycleReport::new();
        let stages: Vec<SyncStage> = STAGE_ORDER
            .into_iter()
            .filter(|s| only.map_or(true, |o| o == *s))
            .collect();

        info!(stages = ?stages, "Starting sync cycle");

        if let Err(e) = self.preflight(&stages).await {
            return report.abort(&e);
        }

        let mut history = HistoryWriter::new(&self.db);

        for stage in stages {
            if !self.stage_enabled(stage) {
                info!(stage = %stage, "Stage disabled, skipping");
                let skipped = StageReport::skipped(stage);
                self.record_run(&skipped).await;
                report.stages.push(skipped);
                continue;
            }

            let started_at = Utc::now();
            info!(stage = %stage, "Stage started");

            let result = match stage {
                SyncStage::Fulfillment => self.run_fulfillment(started_at, &mut history).await,
                SyncStage::Erp => self.run_erp(started_at, &mut history).await,
                SyncStage::Sales => self.run_sales(started_at).await,
            };

            match result {
                Ok(stage_report) => {
                    info!(
                        stage = %stage,
                        outcome = %stage_report.outcome,
                        checked = stage_report.checked,
                        updated = stage_report.updated,
                        inserted = stage_report.inserted,
                        errors = stage_report.errors.len(),
                        "Stage finished"
                    );
                    self.record_run(&stage_report).await;
                    report.stages.push(stage_report);
                }
                Err(e) => {
                    let failed = StageReport::failed(stage, started_at, &e);
                    self.record_run(&failed).await;
                    report.stages.push(failed);

                    if e.is_cycle_fatal() {
                        return report.abort(&e);
                    }
                    warn!(stage = %stage, error = %e, "Stage failed, continuing with next stage");
                }
            }
        }

        report.finished_at = Utc::now();
        info!(
            exit_code = report.exit_code(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Sync cycle finished"
        );
        report
    }

    /// Fetches and aggregates ERP stock without writing anything.
    pub async fn scan_erp(&self) -> SyncResult<ErpScan> {
        let client = self
            .erp
            .as_ref()
            .ok_or_else(|| SyncError::InvalidConfig("erp is disabled".into()))?;
        scan_erp(client, self.config.erp.page_size).await
    }

    /// Checks credentials and the store before any stage runs.
    async fn preflight(&self, stages: &[SyncStage]) -> SyncResult<()> {
        let needs_marketplace = stages.iter().any(|s| {
            self.stage_enabled(*s) && matches!(s, SyncStage::Fulfillment | SyncStage::Sales)
        });
        let needs_erp = stages.contains(&SyncStage::Erp) && self.stage_enabled(SyncStage::Erp);

        if needs_marketplace {
            if let Some(tokens) = &self.marketplace_tokens {
                tokens.access_token().await?;
            }
        }
        if needs_erp {
            if let Some(tokens) = &self.erp_tokens {
                tokens.access_token().await?;
            }
        }

        if !self.db.health_check().await {
            return Err(SyncError::StoreUnavailable(
                "database did not answer health check".into(),
            ));
        }
        Ok(())
    }

    fn marketplace(&self) -> SyncResult<&MarketplaceClient> {
        self.marketplace
            .as_ref()
            .ok_or_else(|| SyncError::InvalidConfig("marketplace client not configured".into()))
    }

    async fn run_fulfillment(
        &self,
        started_at: DateTime<Utc>,
        history: &mut HistoryWriter<'_, Database>,
    ) -> SyncResult<StageReport> {
        let scan = scan_fulfillment(self.marketplace()?, self.config.marketplace.page_size).await?;
        let summary = ReconciliationEngine::new(&self.db)
            .reconcile(&scan.quantities)
            .await?;
        history.record(&scan.quantities).await;

        let mut report = StageReport::new(SyncStage::Fulfillment, started_at);
        report.checked = summary.checked;
        report.updated = summary.updated;
        report.inserted = summary.inserted;
        report.skipped = summary.unchanged;
        report.errors = scan.errors;
        report.errors.extend(summary.errors);

        let truncated = (!scan.stop.is_complete()).then(|| scan.stop.to_string());
        Ok(report.settle(truncated))
    }

    async fn run_erp(
        &self,
        started_at: DateTime<Utc>,
        history: &mut HistoryWriter<'_, Database>,
    ) -> SyncResult<StageReport> {
        let scan = self.scan_erp().await?;
        let summary = ReconciliationEngine::new(&self.db)
            .reconcile(&scan.quantities)
            .await?;
        history.record(&scan.quantities).await;

        let mut report = StageReport::new(SyncStage::Erp, started_at);
        report.checked = summary.checked;
        report.updated = summary.updated;
        report.inserted = summary.inserted;
        report.skipped = summary.unchanged;
        report.errors = scan
            .missing_quantity
            .iter()
            .map(|sku| RowError::new(sku, "no stock balance reported"))
            .collect();
        report.errors.extend(summary.errors);

        let truncated = (!scan.stop.is_complete()).then(|| scan.stop.to_string());
        Ok(report.settle(truncated))
    }

    async fn run_sales(&self, started_at: DateTime<Utc>) -> SyncResult<StageReport> {
        let client = self.marketplace()?;
        let window = SalesWindow::current_month(started_at);
        let orders = client
            .orders(window.from, window.to, self.config.sales.page_size)
            .await?;

        let costs = self.db.purchase_costs().await?;

        let pipeline = SalesPipeline::new(
            &self.db,
            client,
            self.config.pricing.policy(),
            self.config.sales.marketplace_label.clone(),
        );
        let summary = pipeline.import(&orders.items, &costs).await?;

        let mut report = StageReport::new(SyncStage::Sales, started_at);
        report.checked = summary.fetched;
        report.inserted = summary.inserted;
        report.skipped = summary.already_known;
        report.errors = summary.errors;

        let truncated = (!orders.stop.is_complete()).then(|| orders.stop.to_string());
        Ok(report.settle(truncated))
    }

    /// Writes the stage to `sync_runs`. A failed write only warns.
    async fn record_run(&self, report: &StageReport) {
        if let Err(e) = self.db.sync_runs().record(&report.to_run()).await {
            warn!(stage = %report.stage, error = %e, "Failed to record sync run");
        }
    }
}
