//! Progress snapshots for in-flight and finished runs, keyed by document.

use super::mode::Mode;
use crate::document::{Facet, current_timestamp_rfc3339};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Waves are still executing or the commit is pending.
    Running,
    /// Outcomes were committed.
    Completed,
    /// Run was abandoned; nothing was committed.
    Cancelled,
    /// Commit or storage failed; nothing was committed.
    Failed,
}

/// Latest progress of the most recent run for a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    /// Run the snapshot describes.
    pub run_id: Uuid,
    /// Mode of the run.
    pub mode: Mode,
    /// Lifecycle state.
    pub state: RunState,
    /// One-based index of the wave executing, or last executed.
    pub current_wave: usize,
    /// Waves planned for the run.
    pub total_waves: usize,
    /// Stages whose outcome is known.
    pub stages_completed: usize,
    /// Stages planned for the run.
    pub stages_total: usize,
    /// Completed stages as a share of planned stages, `0..=100`.
    pub percentage: u8,
    /// Facets planned for the run, in wave order.
    pub stages: Vec<Facet>,
    /// RFC 3339 time of the last update.
    pub updated_at: String,
}

impl PipelineStatus {
    fn recompute_percentage(&mut self) {
        self.percentage = if self.stages_total == 0 {
            100
        } else {
            ((self.stages_completed * 100) / self.stages_total).min(100) as u8
        };
        self.updated_at = current_timestamp_rfc3339();
    }
}

/// Finished runs kept on a board built with [`StatusBoard::new`].
pub const DEFAULT_FINISHED_RETENTION: usize = 1024;

#[derive(Debug, Default)]
struct Entries {
    by_document: HashMap<String, PipelineStatus>,
    /// Finished runs, oldest first. May hold runs that were since superseded.
    finished: VecDeque<(String, Uuid)>,
}

/// Shared board of [`PipelineStatus`] entries.
///
/// A new run for a document replaces the previous entry; updates from a superseded run are
/// ignored. Running entries are always kept. Finished entries are evicted oldest first once
/// more than `retention` of them are held, so the board holds at most one entry per in-flight
/// run plus `retention`.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    entries: Arc<RwLock<Entries>>,
    retention: usize,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::with_retention(DEFAULT_FINISHED_RETENTION)
    }
}

impl StatusBoard {
    /// Empty board keeping [`DEFAULT_FINISHED_RETENTION`] finished runs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty board keeping at most `retention` finished runs.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            retention,
        }
    }

    /// Number of documents with a status entry.
    pub async fn len(&self) -> usize {
        self.entries.read().await.by_document.len()
    }

    /// Whether the board holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Register a run that is about to execute `waves`.
    pub async fn start(&self, document_id: &str, run_id: Uuid, mode: Mode, waves: &[Vec<Facet>]) {
        let stages: Vec<Facet> = waves.iter().flatten().copied().collect();
        let status = PipelineStatus {
            run_id,
            mode,
            state: RunState::Running,
            current_wave: 0,
            total_waves: waves.len(),
            stages_completed: 0,
            stages_total: stages.len(),
            percentage: 0,
            stages,
            updated_at: current_timestamp_rfc3339(),
        };
        self.entries
            .write()
            .await
            .by_document
            .insert(document_id.to_string(), status);
    }

    /// Mark wave `index` (zero-based) as executing.
    pub async fn wave_started(&self, document_id: &str, run_id: Uuid, index: usize) {
        self.update(document_id, run_id, |status| {
            status.current_wave = index + 1;
        })
        .await;
    }

    /// Record `finished` more stages as settled.
    pub async fn stages_finished(&self, document_id: &str, run_id: Uuid, finished: usize) {
        self.update(document_id, run_id, |status| {
            status.stages_completed = (status.stages_completed + finished).min(status.stages_total);
        })
        .await;
    }

    /// Record the terminal state of a run, evicting the oldest finished entries past the
    /// retention limit.
    pub async fn finish(&self, document_id: &str, run_id: Uuid, state: RunState) {
        let mut entries = self.entries.write().await;
        if !Self::apply(&mut entries, document_id, run_id, |status| status.state = state) {
            return;
        }
        entries.finished.push_back((document_id.to_string(), run_id));
        while entries.finished.len() > self.retention {
            let Some((evicted, evicted_run)) = entries.finished.pop_front() else {
                break;
            };
            let finished = entries.by_document.get(&evicted).is_some_and(|status| {
                status.run_id == evicted_run && status.state != RunState::Running
            });
            if finished {
                entries.by_document.remove(&evicted);
                tracing::trace!(document_id = %evicted, "Evicted finished run status");
            }
        }
    }

    /// Latest status for `document_id`.
    pub async fn get(&self, document_id: &str) -> Option<PipelineStatus> {
        self.entries.read().await.by_document.get(document_id).cloned()
    }

    async fn update(&self, document_id: &str, run_id: Uuid, apply: impl FnOnce(&mut PipelineStatus)) {
        let mut entries = self.entries.write().await;
        Self::apply(&mut entries, document_id, run_id, apply);
    }

    fn apply(
        entries: &mut Entries,
        document_id: &str,
        run_id: Uuid,
        apply: impl FnOnce(&mut PipelineStatus),
    ) -> bool {
        match entries.by_document.get_mut(document_id) {
            Some(status) if status.run_id == run_id => {
                apply(status);
                status.recompute_percentage();
                true
            }
            _ => {
                tracing::debug!(document_id, %run_id, "Ignoring status update from superseded run");
                false
            }
        }
    }
}
