//! Capability adapters: uniform wrappers around the analysis providers behind each facet.
//!
//! Every provider, local heuristic or remote model, is reduced to the same contract: given a
//! [`StageInput`] it returns a value for one [`Facet`] plus a confidence in `[0, 1]`. The
//! scheduler never sees provider-specific behaviour beyond one pass/fail result per call.

pub mod embedding;
pub mod local;
pub mod ollama;
pub(crate) mod text;

use crate::document::{Document, Entity, Facet, FacetValue};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single adapter invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    /// Provider was disabled, unreachable, or declined the input.
    #[error("Capability unavailable: {0}")]
    Unavailable(String),
    /// Provider returned an error.
    #[error("Capability failed: {0}")]
    Failed(String),
    /// Provider response could not be interpreted.
    #[error("Malformed capability response: {0}")]
    InvalidResponse(String),
    /// Call exceeded its per-adapter timeout.
    #[error("Capability timed out after {0:?}")]
    Timeout(Duration),
    /// Adapter produced a value for another facet.
    #[error("Adapter produced a {actual} value for the {expected} stage")]
    WrongFacet {
        /// Facet of the stage being executed.
        expected: Facet,
        /// Facet of the returned value.
        actual: Facet,
    },
    /// Adapter reported a NaN or infinite confidence.
    #[error("Adapter reported a non-finite confidence")]
    NonFiniteConfidence,
}

/// Latency class of an adapter, used to pick its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    /// Regex and lookup work measured in milliseconds.
    Cheap,
    /// Model inference that may take tens of seconds.
    Inference,
}

/// Raw value returned by an adapter before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutput {
    /// Computed facet value.
    pub value: FacetValue,
    /// Provider confidence. Clamped into `[0, 1]` by [`invoke`].
    pub confidence: f32,
}

impl AdapterOutput {
    /// Pair a value with its confidence.
    pub fn new(value: FacetValue, confidence: f32) -> Self {
        Self { value, confidence }
    }
}

/// Interface implemented by every analysis capability.
#[async_trait]
pub trait CapabilityAdapter: Send + Sync {
    /// Facet this adapter produces.
    fn facet(&self) -> Facet;

    /// Method tag recorded alongside produced values.
    fn method(&self) -> &str;

    /// Latency class used to choose the call timeout.
    fn cost(&self) -> Cost {
        Cost::Cheap
    }

    /// Compute the facet for `input`.
    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError>;
}

/// Shared handle to an adapter, as stored in stage chains.
pub type SharedAdapter = Arc<dyn CapabilityAdapter>;

/// Per-call timeouts keyed by [`Cost`].
#[derive(Debug, Clone, Copy)]
pub struct AdapterTimeouts {
    /// Timeout for [`Cost::Cheap`] adapters.
    pub cheap: Duration,
    /// Timeout for [`Cost::Inference`] adapters.
    pub inference: Duration,
}

impl AdapterTimeouts {
    /// Timeout applying to `cost`.
    pub fn for_cost(&self, cost: Cost) -> Duration {
        match cost {
            Cost::Cheap => self.cheap,
            Cost::Inference => self.inference,
        }
    }
}

impl From<&crate::config::Config> for AdapterTimeouts {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            cheap: config.adapter_timeout,
            inference: config.inference_timeout,
        }
    }
}

/// Read-only view of the document handed to adapters.
///
/// Upstream facets that are absent are replaced by empty values: no entities, no keywords,
/// no summary. Text falls back from translation to cleaned source text to raw text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageInput {
    /// Identifier of the document being enriched.
    pub document_id: String,
    /// Text as submitted.
    pub raw_text: String,
    /// Optional headline.
    pub title: Option<String>,
    /// Detected language, if the language facet is available.
    pub language: Option<String>,
    /// Cleaned source text, or the raw text when cleanup has not run.
    pub source_text: String,
    /// English rendition, if the translation facet is available.
    pub translated_text: Option<String>,
    /// Entities, or empty.
    pub entities: Vec<Entity>,
    /// Keywords, or empty.
    pub keywords: Vec<String>,
    /// Summary, if available.
    pub summary: Option<String>,
}

impl StageInput {
    /// Project a document into the view adapters consume.
    pub fn from_document(document: &Document) -> Self {
        Self {
            document_id: document.id.clone(),
            raw_text: document.raw_text.clone(),
            title: document.title.clone(),
            language: document.detected_language.clone(),
            source_text: document
                .source_text
                .clone()
                .unwrap_or_else(|| document.raw_text.clone()),
            translated_text: document.translated_text().map(str::to_string),
            entities: document.entities().to_vec(),
            keywords: document.keywords().to_vec(),
            summary: document
                .summary()
                .filter(|summary| !summary.trim().is_empty())
                .map(str::to_string),
        }
    }

    /// Best available text for analysis: translation, then cleaned source text.
    pub fn analysis_text(&self) -> &str {
        self.translated_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(&self.source_text)
    }

    /// Detected language, or `unknown`.
    pub fn language_or_unknown(&self) -> &str {
        self.language.as_deref().unwrap_or("unknown")
    }
}

/// Invoke `adapter` under `timeout` and normalise its output for `facet`.
///
/// A timed-out call, a value for the wrong facet, and a non-finite confidence are all reported
/// as failures. Finite confidences outside `[0, 1]` are clamped.
pub async fn invoke(
    adapter: &dyn CapabilityAdapter,
    facet: Facet,
    input: &StageInput,
    timeout: Duration,
) -> Result<AdapterOutput, AdapterError> {
    let output = match tokio::time::timeout(timeout, adapter.invoke(input)).await {
        Ok(result) => result?,
        Err(_) => return Err(AdapterError::Timeout(timeout)),
    };

    let actual = output.value.facet();
    if actual != facet {
        return Err(AdapterError::WrongFacet {
            expected: facet,
            actual,
        });
    }
    if !output.confidence.is_finite() {
        return Err(AdapterError::NonFiniteConfidence);
    }

    Ok(AdapterOutput {
        value: output.value,
        confidence: output.confidence.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FacetSlot, LanguageInfo, Translation};

    struct Fixed {
        facet: Facet,
        output: Result<AdapterOutput, AdapterError>,
        delay: Duration,
    }

    #[async_trait]
    impl CapabilityAdapter for Fixed {
        fn facet(&self) -> Facet {
            self.facet
        }

        fn method(&self) -> &str {
            "fixed"
        }

        async fn invoke(&self, _input: &StageInput) -> Result<AdapterOutput, AdapterError> {
            tokio::time::sleep(self.delay).await;
            self.output.clone()
        }
    }

    fn keywords(confidence: f32) -> Fixed {
        Fixed {
            facet: Facet::Keywords,
            output: Ok(AdapterOutput::new(
                FacetValue::Keywords(vec!["alpha".into()]),
                confidence,
            )),
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn clamps_out_of_range_confidence() {
        let adapter = keywords(1.7);
        let output = invoke(
            &adapter,
            Facet::Keywords,
            &StageInput::default(),
            Duration::from_secs(1),
        )
        .await
        .expect("output");
        assert_eq!(output.confidence, 1.0);
    }

    #[tokio::test]
    async fn rejects_nan_confidence() {
        let adapter = keywords(f32::NAN);
        let error = invoke(
            &adapter,
            Facet::Keywords,
            &StageInput::default(),
            Duration::from_secs(1),
        )
        .await
        .expect_err("nan");
        assert_eq!(error, AdapterError::NonFiniteConfidence);
    }

    #[tokio::test]
    async fn rejects_value_for_another_facet() {
        let adapter = keywords(0.5);
        let error = invoke(
            &adapter,
            Facet::Entities,
            &StageInput::default(),
            Duration::from_secs(1),
        )
        .await
        .expect_err("wrong facet");
        assert!(matches!(
            error,
            AdapterError::WrongFacet {
                expected: Facet::Entities,
                actual: Facet::Keywords
            }
        ));
    }

    #[tokio::test]
    async fn slow_adapter_times_out() {
        let mut adapter = keywords(0.5);
        adapter.delay = Duration::from_secs(5);
        let error = invoke(
            &adapter,
            Facet::Keywords,
            &StageInput::default(),
            Duration::from_millis(20),
        )
        .await
        .expect_err("timeout");
        assert_eq!(error, AdapterError::Timeout(Duration::from_millis(20)));
    }

    #[test]
    fn stage_input_prefers_translation_then_source_text() {
        let mut document = Document::new("doc", "  <p>Raw</p> ");
        assert_eq!(StageInput::from_document(&document).analysis_text(), "  <p>Raw</p> ");

        document.install(FacetSlot {
            value: FacetValue::Language(LanguageInfo {
                code: "es".into(),
                source_text: "Raw".into(),
                content_hash: "h".into(),
            }),
            confidence: 1.0,
            method: "regex_cleanup".into(),
            computed_at: "t".into(),
        });
        assert_eq!(StageInput::from_document(&document).analysis_text(), "Raw");

        document.install(FacetSlot {
            value: FacetValue::Translation(Translation {
                text: "Translated".into(),
                source_language: "es".into(),
                target_language: "en".into(),
            }),
            confidence: 0.9,
            method: "mt".into(),
            computed_at: "t".into(),
        });
        let input = StageInput::from_document(&document);
        assert_eq!(input.analysis_text(), "Translated");
        assert!(input.entities.is_empty());
        assert!(input.summary.is_none());
    }
}
