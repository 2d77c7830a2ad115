//! Command execution
//!
//! One `App` per invocation: a connection pool, the two repositories, and a
//! finalizer registry that every started run is registered with. The batch
//! future races `ctrl_c`; on interruption the open run is finalized as
//! failed before the process exits, so no run row is left `Running`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use domain_batch::{
    BatchPolicy, BatchReport, BatchRunner, FinalizerRegistry, RunTracker, StageProcessor,
};
use domain_claims::SubmissionStage;
use domain_visit::{EnhancementStage, ValidationGate, Visit, VisitStore};
use infra_bridge::{BridgeClient, BridgeConfig, ClinicBridge, PortalBridge};
use infra_db::{create_pool, run_migrations, DatabaseConfig, RunRepository, VisitRepository};

use crate::cli::{BatchArgs, ScopeArgs, SubmissionArgs};
use crate::config::CliConfig;
use crate::summary;

pub struct App {
    config: CliConfig,
    visits: Arc<VisitRepository>,
    runs: Arc<RunRepository>,
    registry: FinalizerRegistry,
}

impl App {
    /// Connects to the database and applies pending migrations
    pub async fn connect(config: CliConfig) -> anyhow::Result<Self> {
        let pool = create_pool(DatabaseConfig::new(&config.database_url))
            .await
            .context("connecting to the database")?;
        run_migrations(&pool).await.context("applying migrations")?;

        Ok(Self {
            visits: Arc::new(VisitRepository::new(pool.clone())),
            runs: Arc::new(RunRepository::new(pool)),
            registry: FinalizerRegistry::new(),
            config,
        })
    }

    fn bridge_client(&self) -> anyhow::Result<BridgeClient> {
        let mut bridge = BridgeConfig::new(&self.config.bridge_url)
            .request_timeout(Duration::from_secs(self.config.bridge_timeout_secs));
        if let Some(token) = &self.config.bridge_token {
            bridge = bridge.auth_token(token.clone());
        }
        BridgeClient::new(bridge).context("building the bridge client")
    }

    async fn candidates(&self, scope: &ScopeArgs) -> anyhow::Result<Vec<Visit>> {
        let query = scope.to_query()?;
        let visits = self
            .visits
            .find(&query)
            .await
            .context("loading candidate visits")?;
        info!(count = visits.len(), "candidate visits loaded");
        Ok(visits)
    }

    /// Runs one stage over the candidates, finalizing the run record on
    /// interruption as well as on normal completion
    async fn run_batch<P>(
        &self,
        stage: &P,
        candidates: &[Visit],
        policy: &BatchPolicy,
    ) -> anyhow::Result<BatchReport>
    where
        P: StageProcessor<Visit>,
    {
        let runner = BatchRunner::new(RunTracker::new(self.runs.clone()));

        let result = tokio::select! {
            result = runner.run(stage, candidates, policy, &self.registry) => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; finalizing the open run");
                self.registry.finalize_all().await;
                std::process::exit(1);
            }
        };
        // Normal path: the runner already finalized its run, so this only
        // catches runs cut short by a batch-fatal error path.
        self.registry.finalize_all().await;

        result.context("batch aborted")
    }

    pub async fn enhance(&self, scope: &ScopeArgs, batch: &BatchArgs) -> anyhow::Result<i32> {
        let candidates = self.candidates(scope).await?;
        if candidates.is_empty() {
            println!("No visits matched the given scope.");
            return Ok(0);
        }

        let driver = Arc::new(ClinicBridge::new(self.bridge_client()?));
        let stage = EnhancementStage::new(self.visits.clone(), driver);
        let report = self.run_batch(&stage, &candidates, &batch.policy()).await?;

        summary::print_batch("enhancement", &report);
        Ok(0)
    }

    pub async fn submit(
        &self,
        scope: &ScopeArgs,
        batch: &BatchArgs,
        submission: &SubmissionArgs,
    ) -> anyhow::Result<i32> {
        let candidates = self.candidates(scope).await?;
        if candidates.is_empty() {
            println!("No visits matched the given scope.");
            return Ok(0);
        }

        let policy = submission.policy();
        if !policy.save_as_draft && !policy.allow_live_submit {
            println!("Fill-only run: forms will be filled but nothing will be saved.");
        }

        let driver = Arc::new(PortalBridge::new(self.bridge_client()?));
        let stage = SubmissionStage::new(self.visits.clone(), driver, policy)
            .keep_session(submission.keep_session);
        let report = self.run_batch(&stage, &candidates, &batch.policy()).await?;

        summary::print_batch("submission", &report);
        Ok(0)
    }

    pub async fn validate(&self, scope: &ScopeArgs) -> anyhow::Result<i32> {
        let query = scope.to_query()?;
        let gate = ValidationGate::new(self.visits.clone());
        let report = gate.scan(&query).await.context("scanning visits")?;

        summary::print_gate(&report);
        Ok(if report.hard_failure() { 2 } else { 0 })
    }
}
