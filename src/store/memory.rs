//! Process-local store, used by default and in tests.

use super::{DocumentStore, StoreError, Versioned, check_revision};
use crate::document::Document;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Documents held in a map guarded by an async lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Versioned>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether no document has been stored.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, document_id: &str) -> Result<Option<Versioned>, StoreError> {
        Ok(self.documents.read().await.get(document_id).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected: Option<u64>,
        document: &Document,
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().await;
        let actual = documents.get(&document.id).map(|stored| stored.revision);
        let revision = check_revision(&document.id, expected, actual)?;
        documents.insert(
            document.id.clone(),
            Versioned {
                revision,
                document: document.clone(),
            },
        );
        Ok(revision)
    }
}
