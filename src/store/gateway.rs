//! Single writer for stored documents.
//!
//! Every commit re-reads the freshest revision, merges the run's outcomes into it, and writes
//! with compare-and-swap. Commits for the same document are serialised by a per-document lock;
//! writers outside this process are caught by the revision check and retried.

use super::{DocumentStore, SharedStore, StoreError};
use crate::document::Document;
use crate::pipeline::context::FacetOutcome;
use crate::pipeline::merge::{FacetDecision, merge};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Reasons a commit did not land.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Concurrent writers kept changing the document.
    #[error("gave up committing '{document_id}' after {attempts} conflicting attempts")]
    Contention {
        /// Document being committed.
        document_id: String,
        /// Attempts made, including the first.
        attempts: usize,
    },
}

/// Fields used to create a document on first ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSeed {
    /// Submitted text.
    pub raw_text: String,
    /// Optional headline.
    pub title: Option<String>,
}

impl DocumentSeed {
    /// Seed from raw text alone.
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            title: None,
        }
    }

    /// Fresh document with empty facet slots.
    pub fn to_document(&self, document_id: &str) -> Document {
        let document = Document::new(document_id, self.raw_text.clone());
        match &self.title {
            Some(title) => document.with_title(title.clone()),
            None => document,
        }
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitResult {
    /// Document as stored.
    pub document: Document,
    /// Merge decision per outcome.
    pub decisions: Vec<FacetDecision>,
    /// Stored revision after the commit.
    pub revision: u64,
    /// Conflicts that forced a re-read.
    pub retries: usize,
    /// Whether merge changed nothing and the write was skipped.
    pub unchanged: bool,
}

/// Serialises read-merge-write cycles per document.
pub struct PersistenceGateway {
    store: SharedStore,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    max_retries: usize,
}

impl PersistenceGateway {
    /// Gateway over `store`, retrying conflicting commits up to `max_retries` times.
    pub fn new(store: SharedStore, max_retries: usize) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            max_retries,
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Stored document, if any.
    pub async fn load(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .store
            .load(document_id)
            .await?
            .map(|stored| stored.document))
    }

    /// Stored document, or a fresh one built from `seed`.
    pub async fn snapshot(
        &self,
        document_id: &str,
        seed: &DocumentSeed,
    ) -> Result<Document, StoreError> {
        Ok(self
            .load(document_id)
            .await?
            .unwrap_or_else(|| seed.to_document(document_id)))
    }

    /// Merge `outcomes` into the freshest stored document and write the result.
    ///
    /// Replaying the same outcomes against the same stored state changes nothing.
    pub async fn commit_outcomes(
        &self,
        document_id: &str,
        seed: &DocumentSeed,
        outcomes: &[FacetOutcome],
    ) -> Result<CommitResult, CommitError> {
        let lock = self.lock_for(document_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.commit_locked(document_id, seed, outcomes).await
        };
        drop(lock);
        self.release_lock(document_id).await;
        result
    }

    async fn commit_locked(
        &self,
        document_id: &str,
        seed: &DocumentSeed,
        outcomes: &[FacetOutcome],
    ) -> Result<CommitResult, CommitError> {
        let mut retries = 0;
        loop {
            let stored = self.store.load(document_id).await?;
            let (expected, base) = match stored {
                Some(stored) => (Some(stored.revision), stored.document),
                None => (None, seed.to_document(document_id)),
            };
            let merged = merge(&base, outcomes);

            if let Some(revision) = expected.filter(|_| merged.document == base) {
                tracing::debug!(document_id, revision, "Merge changed nothing; skipping write");
                return Ok(CommitResult {
                    document: merged.document,
                    decisions: merged.decisions,
                    revision,
                    retries,
                    unchanged: true,
                });
            }

            match self.store.compare_and_swap(expected, &merged.document).await {
                Ok(revision) => {
                    tracing::debug!(document_id, revision, retries, "Committed document");
                    return Ok(CommitResult {
                        document: merged.document,
                        decisions: merged.decisions,
                        revision,
                        retries,
                        unchanged: false,
                    });
                }
                Err(StoreError::Conflict { .. }) if retries < self.max_retries => {
                    retries += 1;
                    tracing::warn!(document_id, retries, "Commit conflicted; re-reading document");
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(CommitError::Contention {
                        document_id: document_id.to_string(),
                        attempts: retries + 1,
                    });
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    async fn lock_for(&self, document_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the document's lock once no commit holds or waits on it.
    async fn release_lock(&self, document_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(document_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(document_id);
        }
    }
}
