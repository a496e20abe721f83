//! One pretty-printed JSON file per document.
//!
//! Writes go to a temporary sibling first and are renamed into place, so readers never see a
//! half-written document.

use super::{DocumentStore, StoreError, Versioned, check_revision};
use crate::document::Document;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Store rooted at a directory.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) the store directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the document files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, document_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(document_id)))
    }

    async fn read(&self, document_id: &str) -> Result<Option<Versioned>, StoreError> {
        match tokio::fs::read(self.path_for(document_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

/// Identifiers made of safe characters map to themselves; anything else is hashed.
///
/// Hashed stems start with `#`, which no safe identifier contains.
fn file_stem(document_id: &str) -> String {
    let safe = !document_id.is_empty()
        && document_id.len() <= 128
        && document_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        document_id.to_string()
    } else {
        let mut hasher = Sha256::new();
        hasher.update(document_id.as_bytes());
        format!("#sha256-{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self, document_id: &str) -> Result<Option<Versioned>, StoreError> {
        self.read(document_id).await
    }

    async fn compare_and_swap(
        &self,
        expected: Option<u64>,
        document: &Document,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let actual = self.read(&document.id).await?.map(|stored| stored.revision);
        let revision = check_revision(&document.id, expected, actual)?;

        let bytes = serde_json::to_vec_pretty(&Versioned {
            revision,
            document: document.clone(),
        })?;
        let path = self.path_for(&document.id);
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &path).await?;
        tracing::debug!(document_id = %document.id, revision, path = %path.display(), "Stored document");
        Ok(revision)
    }
}
