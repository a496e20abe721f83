//! Request, report, and error types exposed by the pipeline service.

use super::graph::GraphError;
use super::mode::Mode;
use super::quality::QualityAssessment;
use crate::config::ConfigError;
use crate::document::{Document, Facet, FacetParseError};
use crate::store::StoreError;
use crate::store::gateway::CommitError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the pipeline entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A requested facet name is not recognised.
    #[error(transparent)]
    UnknownFacet(#[from] FacetParseError),
    /// A requested facet has no stage in the configured graph.
    #[error("no stage is declared for facet '{0}'")]
    UndeclaredStage(Facet),
    /// `trigger_facet` named a document that was never ingested.
    #[error("document '{0}' has not been ingested")]
    DocumentNotFound(String),
    /// The run was cancelled; nothing was persisted.
    #[error("pipeline run cancelled")]
    Cancelled,
    /// Reading the stored document failed.
    #[error("failed to read stored document: {0}")]
    Store(#[from] StoreError),
    /// Writing the merged document failed.
    #[error("failed to commit merged document: {0}")]
    Commit(#[from] CommitError),
    /// The stage graph was invalid.
    #[error("invalid stage graph: {0}")]
    Graph(#[from] GraphError),
    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Input to [`super::PipelineService::process`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    /// Stable document identity.
    pub document_id: String,
    /// Submitted text.
    pub raw_text: String,
    /// Optional headline.
    pub title: Option<String>,
    /// Facet names explicitly requested, possibly empty.
    pub facets: Vec<String>,
}

impl ProcessRequest {
    /// Request a Reduced run over `raw_text`.
    pub fn new(document_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            raw_text: raw_text.into(),
            title: None,
            facets: Vec::new(),
        }
    }

    /// Attach a headline.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Request facets by name.
    pub fn with_facets<I, S>(mut self, facets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.facets = facets.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-facet result reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FacetStatus {
    /// The run's value was stored.
    Ok {
        /// Adapter that produced it.
        method: String,
        /// Its confidence.
        confidence: f32,
    },
    /// A more confident stored value was kept.
    Preserved {
        /// Confidence of the kept value.
        stored: f32,
        /// Confidence the run offered.
        offered: f32,
    },
    /// Every adapter failed; any stored value was left in place.
    Unavailable {
        /// Last adapter error.
        error: String,
    },
}

/// Summary of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identity, also present in logs and status.
    pub run_id: Uuid,
    /// Mode the run executed in.
    pub mode: Mode,
    /// Document as committed.
    pub document: Document,
    /// Status of every stage that ran.
    pub facets: BTreeMap<Facet, FacetStatus>,
    /// Advisory quality of the committed document.
    pub quality: QualityAssessment,
    /// Stored revision after the commit.
    pub revision: u64,
    /// Wall-clock time from request to commit.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl RunReport {
    /// Facets reported [`FacetStatus::Unavailable`].
    pub fn unavailable(&self) -> impl Iterator<Item = Facet> + '_ {
        self.facets
            .iter()
            .filter(|(_, status)| matches!(status, FacetStatus::Unavailable { .. }))
            .map(|(facet, _)| *facet)
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().min(u128::from(u64::MAX)) as u64)
    }
}
