//! Pipeline service coordinating mode selection, scheduling, merge, and persistence.

use super::context::RunContext;
use super::graph::StageGraph;
use super::merge::{MergeDecision, tally};
use super::mode::Mode;
use super::quality::assess;
use super::scheduler::{CancelHandle, ScheduleError, Scheduler};
use super::status::{PipelineStatus, RunState, StatusBoard};
use super::types::{FacetStatus, PipelineError, ProcessRequest, RunReport};
use crate::adapter::AdapterTimeouts;
use crate::config::{Config, init_config};
use crate::document::Facet;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::store::gateway::{CommitResult, DocumentSeed, PersistenceGateway};
use crate::store::{SharedStore, store_from_config};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Entry points used by discovery jobs and interactive callers.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Enrich a document, creating it on first ingestion.
    async fn process_document(
        &self,
        document_id: &str,
        raw_text: &str,
        requested_facets: &[&str],
    ) -> Result<RunReport, PipelineError>;

    /// Recompute one facet of a stored document, plus whatever its mode requires.
    async fn trigger_facet(
        &self,
        document_id: &str,
        facet_name: &str,
    ) -> Result<RunReport, PipelineError>;

    /// Progress of the latest run for `document_id`.
    async fn pipeline_status(&self, document_id: &str) -> Option<PipelineStatus>;

    /// Current counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the stage graph, scheduler, gateway, status board, and metrics.
///
/// Build once near process start and share behind an `Arc`.
pub struct PipelineService {
    scheduler: Scheduler,
    gateway: PersistenceGateway,
    status: StatusBoard,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineService {
    /// Assemble a service from its parts.
    pub fn new(
        graph: StageGraph,
        store: SharedStore,
        timeouts: AdapterTimeouts,
        commit_max_retries: usize,
    ) -> Self {
        let status = StatusBoard::new();
        Self {
            scheduler: Scheduler::new(Arc::new(graph), timeouts, status.clone()),
            gateway: PersistenceGateway::new(store, commit_max_retries),
            status,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Standard graph and configured store.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let graph = StageGraph::standard(config)?;
        let store = store_from_config(config)?;
        tracing::info!(
            ollama = config.ollama_url.is_some(),
            commit_max_retries = config.commit_max_retries,
            "Pipeline service initialized"
        );
        Ok(Self::new(
            graph,
            store,
            AdapterTimeouts::from(config),
            config.commit_max_retries,
        ))
    }

    /// Load configuration from the environment, then build as [`Self::from_config`].
    pub fn from_env() -> Result<Self, PipelineError> {
        let config = init_config()?;
        Self::from_config(config)
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Persistence gateway, for reads outside a run.
    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    /// Run the pipeline for `request`, honouring `cancel`.
    pub async fn process(
        &self,
        request: ProcessRequest,
        cancel: &CancelHandle,
    ) -> Result<RunReport, PipelineError> {
        let requested = self.parse_facets(&request.facets)?;
        let seed = DocumentSeed {
            raw_text: request.raw_text,
            title: request.title,
        };
        self.execute(&request.document_id, seed, requested, cancel)
            .await
    }

    /// Recompute `facet_name` for a stored document, honouring `cancel`.
    pub async fn trigger_facet_with(
        &self,
        document_id: &str,
        facet_name: &str,
        cancel: &CancelHandle,
    ) -> Result<RunReport, PipelineError> {
        let requested = self.parse_facets(&[facet_name])?;
        let stored = self
            .gateway
            .load(document_id)
            .await?
            .ok_or_else(|| PipelineError::DocumentNotFound(document_id.to_string()))?;
        let seed = DocumentSeed {
            raw_text: stored.raw_text,
            title: stored.title,
        };
        self.execute(document_id, seed, requested, cancel).await
    }

    fn parse_facets<S: AsRef<str>>(&self, names: &[S]) -> Result<BTreeSet<Facet>, PipelineError> {
        let mut facets = BTreeSet::new();
        for name in names {
            let facet: Facet = name.as_ref().parse()?;
            if !self.scheduler.graph().contains(facet) {
                return Err(PipelineError::UndeclaredStage(facet));
            }
            facets.insert(facet);
        }
        Ok(facets)
    }

    async fn execute(
        &self,
        document_id: &str,
        seed: DocumentSeed,
        requested: BTreeSet<Facet>,
        cancel: &CancelHandle,
    ) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let mode = Mode::decide(&requested);

        let snapshot = match self.gateway.snapshot(document_id, &seed).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.metrics.record_failed();
                tracing::error!(%run_id, document_id, error = %error, "Failed to read document");
                return Err(error.into());
            }
        };

        let context = match self
            .scheduler
            .run(run_id, mode, snapshot, &requested, cancel)
            .await
        {
            Ok(context) => context,
            Err(ScheduleError::Cancelled { .. }) => {
                self.metrics.record_cancelled();
                self.status
                    .finish(document_id, run_id, RunState::Cancelled)
                    .await;
                return Err(PipelineError::Cancelled);
            }
        };

        let failed_attempts: usize = context
            .outcomes
            .iter()
            .map(|outcome| outcome.failed_attempts())
            .sum();
        self.metrics.record_adapter_failures(failed_attempts as u64);

        let committed = match self
            .gateway
            .commit_outcomes(document_id, &seed, &context.outcomes)
            .await
        {
            Ok(committed) => committed,
            Err(error) => {
                self.metrics.record_failed();
                self.status
                    .finish(document_id, run_id, RunState::Failed)
                    .await;
                tracing::error!(%run_id, document_id, error = %error, "Commit failed; prior state kept");
                return Err(error.into());
            }
        };

        self.metrics.record_commit_retries(committed.retries as u64);
        let (adopted, preserved) = tally(&committed.decisions);
        self.metrics.record_run(adopted, preserved);
        self.status
            .finish(document_id, run_id, RunState::Completed)
            .await;

        let report = build_report(&context, committed, started);
        tracing::info!(
            %run_id,
            document_id,
            %mode,
            adopted,
            preserved,
            unavailable = report.unavailable().count(),
            tier = report.quality.tier,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Pipeline run committed"
        );
        Ok(report)
    }
}

fn build_report(context: &RunContext, committed: CommitResult, started: Instant) -> RunReport {
    let mut facets = BTreeMap::new();
    for (outcome, decision) in context.outcomes.iter().zip(&committed.decisions) {
        let status = match (&decision.decision, outcome.slot(), outcome.error()) {
            (MergeDecision::Adopted { confidence }, Some(slot), _) => FacetStatus::Ok {
                method: slot.method.clone(),
                confidence: *confidence,
            },
            (MergeDecision::Preserved { stored, offered }, _, _) => FacetStatus::Preserved {
                stored: *stored,
                offered: *offered,
            },
            (_, _, error) => FacetStatus::Unavailable {
                error: error
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "no value produced".to_string()),
            },
        };
        facets.insert(outcome.facet, status);
    }

    RunReport {
        run_id: context.run_id,
        mode: context.mode,
        quality: assess(&committed.document),
        document: committed.document,
        facets,
        revision: committed.revision,
        elapsed: started.elapsed(),
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn process_document(
        &self,
        document_id: &str,
        raw_text: &str,
        requested_facets: &[&str],
    ) -> Result<RunReport, PipelineError> {
        let request = ProcessRequest::new(document_id, raw_text)
            .with_facets(requested_facets.iter().copied());
        self.process(request, &CancelHandle::new()).await
    }

    async fn trigger_facet(
        &self,
        document_id: &str,
        facet_name: &str,
    ) -> Result<RunReport, PipelineError> {
        self.trigger_facet_with(document_id, facet_name, &CancelHandle::new())
            .await
    }

    async fn pipeline_status(&self, document_id: &str) -> Option<PipelineStatus> {
        self.status.get(document_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
