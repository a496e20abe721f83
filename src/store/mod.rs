//! Document storage behind an optimistic compare-and-swap contract.
//!
//! Backends keep a revision counter next to each document. Writers name the revision they
//! read; a write against any other revision fails with [`StoreError::Conflict`] and the caller
//! re-reads. [`gateway::PersistenceGateway`] is the only writer inside the crate.

pub mod gateway;
pub mod json_file;
pub mod memory;

use crate::config::Config;
use crate::document::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stored revision differs from the one the writer read.
    #[error("revision conflict for '{document_id}': expected {expected:?}, found {actual:?}")]
    Conflict {
        /// Document being written.
        document_id: String,
        /// Revision the writer read, `None` for a first insert.
        expected: Option<u64>,
        /// Revision currently stored.
        actual: Option<u64>,
    },
    /// Filesystem access failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Stored bytes could not be encoded or decoded.
    #[error("stored document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A stored document together with its revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    /// Incremented on every successful write, starting at 1.
    pub revision: u64,
    /// Stored document.
    pub document: Document,
}

/// Durable home of enriched documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the current revision of `document_id`.
    async fn load(&self, document_id: &str) -> Result<Option<Versioned>, StoreError>;

    /// Write `document` if the stored revision still equals `expected`.
    ///
    /// `expected == None` means the document must not exist yet. Returns the new revision.
    async fn compare_and_swap(
        &self,
        expected: Option<u64>,
        document: &Document,
    ) -> Result<u64, StoreError>;
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Pick the backend named by configuration: JSON files under `FACETFLOW_STORE_DIR`, or memory.
pub fn store_from_config(config: &Config) -> Result<SharedStore, StoreError> {
    match &config.store_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Using JSON file document store");
            Ok(Arc::new(json_file::JsonFileStore::open(dir)?))
        }
        None => {
            tracing::info!("Using in-memory document store");
            Ok(Arc::new(memory::MemoryStore::new()))
        }
    }
}

pub(crate) fn check_revision(
    document_id: &str,
    expected: Option<u64>,
    actual: Option<u64>,
) -> Result<u64, StoreError> {
    if expected != actual {
        return Err(StoreError::Conflict {
            document_id: document_id.to_string(),
            expected,
            actual,
        });
    }
    Ok(actual.map_or(1, |revision| revision + 1))
}
