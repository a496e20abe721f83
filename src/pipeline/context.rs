//! Per-run state produced by the scheduler and consumed by merge.

use super::mode::Mode;
use crate::adapter::AdapterError;
use crate::document::{Document, Facet, FacetSlot};
use uuid::Uuid;

/// One adapter call made while computing a facet.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// Method tag of the adapter.
    pub method: String,
    /// Failure, or `None` when the call succeeded.
    pub error: Option<AdapterError>,
}

/// Result of a stage: a complete slot or the last adapter error.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeResult {
    /// First successful adapter in the chain.
    Succeeded(FacetSlot),
    /// Every adapter in the chain failed.
    Failed {
        /// Error of the last attempted adapter.
        error: AdapterError,
    },
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetOutcome {
    /// Stage that produced the outcome.
    pub facet: Facet,
    /// Value or failure.
    pub result: OutcomeResult,
    /// Every adapter call, in chain order.
    pub attempts: Vec<AttemptRecord>,
}

impl FacetOutcome {
    /// Successful outcome carrying `slot`.
    pub fn succeeded(slot: FacetSlot, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            facet: slot.facet(),
            result: OutcomeResult::Succeeded(slot),
            attempts,
        }
    }

    /// Failed outcome for `facet`.
    pub fn failed(facet: Facet, error: AdapterError, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            facet,
            result: OutcomeResult::Failed { error },
            attempts,
        }
    }

    /// Whether an adapter produced a value.
    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Succeeded(_))
    }

    /// Produced slot, if any.
    pub fn slot(&self) -> Option<&FacetSlot> {
        match &self.result {
            OutcomeResult::Succeeded(slot) => Some(slot),
            OutcomeResult::Failed { .. } => None,
        }
    }

    /// Final error, if the stage failed.
    pub fn error(&self) -> Option<&AdapterError> {
        match &self.result {
            OutcomeResult::Succeeded(_) => None,
            OutcomeResult::Failed { error } => Some(error),
        }
    }

    /// Number of failed adapter calls, including ones recovered by a fallback.
    pub fn failed_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.error.is_some())
            .count()
    }
}

/// Everything one invocation of the scheduler produced.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifier shared by logs, status, and the report.
    pub run_id: Uuid,
    /// Mode the run executed in.
    pub mode: Mode,
    /// Document as read before the first wave.
    pub snapshot: Document,
    /// Planned waves, in execution order.
    pub waves: Vec<Vec<Facet>>,
    /// Outcomes in wave order; within a wave, in facet order.
    pub outcomes: Vec<FacetOutcome>,
}

impl RunContext {
    /// Outcome for `facet`, if its stage ran.
    pub fn outcome(&self, facet: Facet) -> Option<&FacetOutcome> {
        self.outcomes.iter().find(|outcome| outcome.facet == facet)
    }

    /// Failed adapter calls across the run.
    pub fn error_log(&self) -> impl Iterator<Item = (Facet, &AttemptRecord)> {
        self.outcomes.iter().flat_map(|outcome| {
            outcome
                .attempts
                .iter()
                .filter(|attempt| attempt.error.is_some())
                .map(move |attempt| (outcome.facet, attempt))
        })
    }
}
