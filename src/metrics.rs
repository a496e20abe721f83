use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    runs_completed: AtomicU64,
    runs_cancelled: AtomicU64,
    runs_failed: AtomicU64,
    facets_adopted: AtomicU64,
    facets_preserved: AtomicU64,
    adapter_failures: AtomicU64,
    commit_retries: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed run together with its merge decisions.
    pub fn record_run(&self, adopted: u64, preserved: u64) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.facets_adopted.fetch_add(adopted, Ordering::Relaxed);
        self.facets_preserved.fetch_add(preserved, Ordering::Relaxed);
    }

    /// Record a run abandoned through its cancel handle.
    pub fn record_cancelled(&self) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that ended with a fatal error.
    pub fn record_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record failed adapter attempts, including ones later recovered by a fallback.
    pub fn record_adapter_failures(&self, count: u64) {
        self.adapter_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Record conflicting commits that forced a re-read.
    pub fn record_commit_retries(&self, count: u64) {
        self.commit_retries.fetch_add(count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            facets_adopted: self.facets_adopted.load(Ordering::Relaxed),
            facets_preserved: self.facets_preserved.load(Ordering::Relaxed),
            adapter_failures: self.adapter_failures.load(Ordering::Relaxed),
            commit_retries: self.commit_retries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs whose merged document was committed.
    pub runs_completed: u64,
    /// Runs cancelled before commit.
    pub runs_cancelled: u64,
    /// Runs that failed with a storage or commit error.
    pub runs_failed: u64,
    /// Facet values written over an empty or weaker slot.
    pub facets_adopted: u64,
    /// Facet values rejected because the stored slot was more confident.
    pub facets_preserved: u64,
    /// Adapter attempts that errored or timed out.
    pub adapter_failures: u64,
    /// Optimistic commit conflicts that were retried.
    pub commit_retries: u64,
}
