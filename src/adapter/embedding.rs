//! Search-vector adapters and the text they embed.

use super::ollama::OllamaClient;
use super::text::truncate_chars;
use super::{AdapterError, AdapterOutput, CapabilityAdapter, Cost, StageInput};
use crate::document::{Facet, FacetValue};
use async_trait::async_trait;

/// Characters of body text appended to the embedding input.
const BODY_PREFIX_CHARS: usize = 500;

/// Compose the text to embed: title, summary, keywords, then the opening of the body.
///
/// Absent parts are skipped, so a Reduced run embeds title, keywords and body only.
pub fn embedding_input(input: &StageInput) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(title) = input.title.as_deref().filter(|title| !title.trim().is_empty()) {
        parts.push(title.trim().to_string());
    }
    if let Some(summary) = input.summary.as_deref() {
        parts.push(summary.trim().to_string());
    }
    if !input.keywords.is_empty() {
        parts.push(input.keywords.join(", "));
    }
    let body = input.analysis_text().trim();
    if !body.is_empty() {
        parts.push(truncate_chars(body, BODY_PREFIX_CHARS));
    }
    parts.join(". ")
}

/// Deterministic bag-of-bytes vector, normalised to unit length.
#[derive(Debug, Clone, Copy)]
pub struct HashedEmbedding {
    dimension: usize,
}

impl HashedEmbedding {
    /// Produce vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];
        for (idx, byte) in text.bytes().enumerate() {
            embedding[idx % dimension] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl CapabilityAdapter for HashedEmbedding {
    fn facet(&self) -> Facet {
        Facet::Embedding
    }

    fn method(&self) -> &str {
        "hashed_bytes"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        if self.dimension == 0 {
            return Err(AdapterError::Failed(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        let text = embedding_input(input);
        if text.is_empty() {
            return Err(AdapterError::Failed("no text to embed".into()));
        }
        tracing::debug!(dimension = self.dimension, "Encoding hashed embedding");
        Ok(AdapterOutput::new(
            FacetValue::Embedding(Self::encode(&text, self.dimension)),
            0.5,
        ))
    }
}

/// Vectors from an Ollama embedding model.
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: OllamaClient,
    model: String,
    dimension: usize,
}

impl OllamaEmbedding {
    /// Embed with `model`, rejecting vectors whose length is not `dimension`.
    pub fn new(client: OllamaClient, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl CapabilityAdapter for OllamaEmbedding {
    fn facet(&self) -> Facet {
        Facet::Embedding
    }

    fn method(&self) -> &str {
        "ollama_embed"
    }

    fn cost(&self) -> Cost {
        Cost::Inference
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let text = embedding_input(input);
        if text.is_empty() {
            return Err(AdapterError::Failed("no text to embed".into()));
        }
        let vector = self.client.embed(&self.model, &text).await?;
        if vector.len() != self.dimension {
            return Err(AdapterError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(AdapterOutput::new(FacetValue::Embedding(vector), 0.9))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn input() -> StageInput {
        StageInput {
            document_id: "doc".into(),
            raw_text: "raw".into(),
            title: Some("Floods in Mumbai".into()),
            source_text: "Heavy rain flooded the city.".into(),
            keywords: vec!["rain".into(), "flood".into()],
            ..StageInput::default()
        }
    }

    #[test]
    fn input_composition_skips_missing_parts() {
        assert_eq!(
            embedding_input(&input()),
            "Floods in Mumbai. rain, flood. Heavy rain flooded the city."
        );

        let mut with_summary = input();
        with_summary.summary = Some("City flooded.".into());
        assert!(embedding_input(&with_summary).starts_with("Floods in Mumbai. City flooded. rain"));
    }

    #[tokio::test]
    async fn hashed_vectors_are_unit_length_and_deterministic() {
        let adapter = HashedEmbedding::new(16);
        let first = adapter.invoke(&input()).await.expect("vector");
        let second = adapter.invoke(&input()).await.expect("vector");
        assert_eq!(first, second);

        let FacetValue::Embedding(vector) = first.value else {
            panic!("expected embedding");
        };
        assert_eq!(vector.len(), 16);
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn zero_dimension_fails() {
        let error = HashedEmbedding::new(0)
            .invoke(&input())
            .await
            .expect_err("zero dimension");
        assert!(matches!(error, AdapterError::Failed(_)));
    }

    #[tokio::test]
    async fn ollama_embedding_checks_dimension() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(json!({ "embeddings": [[0.1, 0.2]] }));
            })
            .await;

        let adapter = OllamaEmbedding::new(OllamaClient::new(server.base_url()), "nomic", 3);
        let error = adapter.invoke(&input()).await.expect_err("dimension mismatch");
        assert!(matches!(error, AdapterError::InvalidResponse(_)));
    }
}
