//! Wave scheduler: runs the planned stages against one document snapshot.
//!
//! Stages of a wave run concurrently and the scheduler waits for all of them before starting
//! the next wave. Every stage of a wave reads the same [`StageInput`], built from the snapshot
//! plus the outcomes of earlier waves, so nothing computed in a wave is visible inside it.

use super::context::{AttemptRecord, FacetOutcome, RunContext};
use super::graph::{Stage, StageGraph};
use super::merge::merge;
use super::mode::Mode;
use super::status::StatusBoard;
use crate::adapter::{self, AdapterError, AdapterTimeouts, StageInput};
use crate::document::{Document, Facet, FacetSlot, current_timestamp_rfc3339};
use futures_util::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Cooperative cancellation flag shared between a caller and a run.
///
/// Cancelling lets the calls of the current wave finish, starts no further wave, and discards
/// everything the run computed.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Fresh, uncancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Reasons a scheduled run produced no context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The cancel handle fired; outcomes were discarded.
    #[error("run cancelled after {completed_waves} completed wave(s)")]
    Cancelled {
        /// Waves that had fully finished when the run stopped.
        completed_waves: usize,
    },
}

/// Executes stage graphs.
#[derive(Debug, Clone)]
pub struct Scheduler {
    graph: Arc<StageGraph>,
    timeouts: AdapterTimeouts,
    status: StatusBoard,
}

impl Scheduler {
    /// Scheduler over `graph`, reporting progress to `status`.
    pub fn new(graph: Arc<StageGraph>, timeouts: AdapterTimeouts, status: StatusBoard) -> Self {
        Self {
            graph,
            timeouts,
            status,
        }
    }

    /// Graph the scheduler executes.
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Run every stage required by `mode` and `requested` against `snapshot`.
    pub async fn run(
        &self,
        run_id: Uuid,
        mode: Mode,
        snapshot: Document,
        requested: &BTreeSet<Facet>,
        cancel: &CancelHandle,
    ) -> Result<RunContext, ScheduleError> {
        let waves = self.graph.plan(mode, requested);
        let document_id = snapshot.id.clone();
        self.status.start(&document_id, run_id, mode, &waves).await;
        tracing::info!(
            %run_id,
            document_id = %document_id,
            %mode,
            waves = waves.len(),
            stages = waves.iter().map(Vec::len).sum::<usize>(),
            "Starting pipeline run"
        );

        let mut outcomes: Vec<FacetOutcome> = Vec::new();
        for (index, wave) in waves.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(self.cancelled(&document_id, run_id, index));
            }
            self.status.wave_started(&document_id, run_id, index).await;

            let input = StageInput::from_document(&merge(&snapshot, &outcomes).document);
            let stages = wave.iter().filter_map(|facet| self.graph.stage(*facet));
            let span = tracing::debug_span!("wave", %run_id, wave = index + 1);
            let results = join_all(stages.map(|stage| self.run_stage(stage, &input)))
                .instrument(span)
                .await;

            self.status
                .stages_finished(&document_id, run_id, results.len())
                .await;
            outcomes.extend(results);

            if cancel.is_cancelled() {
                return Err(self.cancelled(&document_id, run_id, index + 1));
            }
        }

        Ok(RunContext {
            run_id,
            mode,
            snapshot,
            waves,
            outcomes,
        })
    }

    fn cancelled(&self, document_id: &str, run_id: Uuid, completed_waves: usize) -> ScheduleError {
        tracing::info!(%run_id, document_id, completed_waves, "Pipeline run cancelled");
        ScheduleError::Cancelled { completed_waves }
    }

    async fn run_stage(&self, stage: &Stage, input: &StageInput) -> FacetOutcome {
        let facet = stage.facet();
        let mut attempts = Vec::with_capacity(stage.chain().len());
        let mut last_error = None;

        for candidate in stage.chain() {
            let method = candidate.method().to_string();
            let timeout = self.timeouts.for_cost(candidate.cost());
            match adapter::invoke(candidate.as_ref(), facet, input, timeout).await {
                Ok(output) => {
                    tracing::debug!(
                        stage = %facet,
                        method = %method,
                        confidence = output.confidence,
                        "Stage succeeded"
                    );
                    attempts.push(AttemptRecord {
                        method: method.clone(),
                        error: None,
                    });
                    let slot = FacetSlot {
                        value: output.value,
                        confidence: output.confidence,
                        method,
                        computed_at: current_timestamp_rfc3339(),
                    };
                    return FacetOutcome::succeeded(slot, attempts);
                }
                Err(error) => {
                    tracing::warn!(
                        stage = %facet,
                        method = %method,
                        error = %error,
                        "Adapter attempt failed"
                    );
                    attempts.push(AttemptRecord {
                        method,
                        error: Some(error.clone()),
                    });
                    last_error = Some(error);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| AdapterError::Unavailable(format!("no adapters for '{facet}'")));
        tracing::warn!(stage = %facet, error = %error, "Stage failed; dependents see an empty value");
        FacetOutcome::failed(facet, error, attempts)
    }
}
