//! Model-backed adapters that talk to an Ollama runtime over HTTP.
//!
//! Generation goes through `/api/generate` with streaming disabled; vectors come from
//! `/api/embed`. Connection failures surface as [`AdapterError::Unavailable`] so the stage chain
//! falls through to the local heuristics.

use super::text::truncate_chars;
use super::{AdapterError, AdapterOutput, CapabilityAdapter, Cost, StageInput};
use crate::document::{Facet, FacetValue, Sentiment, SentimentLabel, Translation};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

/// Longest body forwarded to a prompt, in characters.
const PROMPT_TEXT_LIMIT: usize = 6000;

/// Minimal Ollama HTTP client shared by the model-backed adapters.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    /// Client for the runtime listening at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .user_agent("facetflow/ollama")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<reqwest::Response, AdapterError> {
        let endpoint = self.endpoint(path);
        let response = self
            .http
            .post(&endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                AdapterError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AdapterError::Unavailable(format!(
                "Ollama endpoint {endpoint} returned 404"
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Failed(format!(
                "Ollama returned {status}: {body}"
            )));
        }
        Ok(response)
    }

    /// Run a non-streaming completion and return the trimmed response text.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String, AdapterError> {
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });
        let body: GenerateResponse = self
            .post("generate", &payload)
            .await?
            .json()
            .await
            .map_err(|error| {
                AdapterError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
            })?;

        if !body.done {
            return Err(AdapterError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }
        let text = body.response.trim();
        if text.is_empty() {
            return Err(AdapterError::InvalidResponse("empty completion".into()));
        }
        Ok(text.to_string())
    }

    /// Embed `input` with `model`, returning the first vector.
    pub async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AdapterError> {
        let payload = json!({ "model": model, "input": input });
        let body: EmbedResponse = self
            .post("embed", &payload)
            .await?
            .json()
            .await
            .map_err(|error| {
                AdapterError::InvalidResponse(format!("failed to decode Ollama embedding: {error}"))
            })?;
        body.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::InvalidResponse("no embedding returned".into()))
    }
}

/// Parse the first JSON object embedded in a completion.
fn extract_json_object(completion: &str) -> Result<Value, AdapterError> {
    let start = completion.find('{');
    let end = completion.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&completion[start..=end])
            .map_err(|error| AdapterError::InvalidResponse(format!("invalid JSON: {error}"))),
        _ => Err(AdapterError::InvalidResponse(
            "completion did not contain a JSON object".into(),
        )),
    }
}

fn confidence_field(object: &Value, default: f32) -> f32 {
    object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|value| value as f32)
        .unwrap_or(default)
}

/// Translates non-English source text into English.
#[derive(Debug, Clone)]
pub struct OllamaTranslation {
    client: OllamaClient,
    model: String,
}

impl OllamaTranslation {
    /// Translate with `model`.
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl CapabilityAdapter for OllamaTranslation {
    fn facet(&self) -> Facet {
        Facet::Translation
    }

    fn method(&self) -> &str {
        "ollama_translate"
    }

    fn cost(&self) -> Cost {
        Cost::Inference
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let language = input.language_or_unknown();
        let prompt = format!(
            "Translate the following {language} text into English. Reply with the translation only.\n\n{}",
            truncate_chars(&input.source_text, PROMPT_TEXT_LIMIT)
        );
        let text = self.client.generate(&self.model, &prompt).await?;
        Ok(AdapterOutput::new(
            FacetValue::Translation(Translation {
                text,
                source_language: language.to_string(),
                target_language: "en".into(),
            }),
            0.85,
        ))
    }
}

/// Abstractive summary of the analysis text.
#[derive(Debug, Clone)]
pub struct OllamaSummary {
    client: OllamaClient,
    model: String,
    max_words: usize,
}

impl OllamaSummary {
    /// Summarize with `model` in at most `max_words` words.
    pub fn new(client: OllamaClient, model: impl Into<String>, max_words: usize) -> Self {
        Self {
            client,
            model: model.into(),
            max_words,
        }
    }
}

#[async_trait]
impl CapabilityAdapter for OllamaSummary {
    fn facet(&self) -> Facet {
        Facet::Summary
    }

    fn method(&self) -> &str {
        "ollama_abstractive"
    }

    fn cost(&self) -> Cost {
        Cost::Inference
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let prompt = format!(
            "Summarize the following article in at most {} words. Reply with the summary only.\n\n{}",
            self.max_words,
            truncate_chars(input.analysis_text(), PROMPT_TEXT_LIMIT)
        );
        let summary = self.client.generate(&self.model, &prompt).await?;
        let confidence = if summary.chars().count() > 50 { 0.85 } else { 0.3 };
        Ok(AdapterOutput::new(FacetValue::Summary(summary), confidence))
    }
}

/// Sentiment verdict from the model, read from the summary when one exists.
#[derive(Debug, Clone)]
pub struct OllamaSentiment {
    client: OllamaClient,
    model: String,
}

impl OllamaSentiment {
    /// Classify with `model`.
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl CapabilityAdapter for OllamaSentiment {
    fn facet(&self) -> Facet {
        Facet::Sentiment
    }

    fn method(&self) -> &str {
        "ollama_sentiment"
    }

    fn cost(&self) -> Cost {
        Cost::Inference
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let text = input.summary.as_deref().unwrap_or(input.analysis_text());
        let prompt = format!(
            "Classify the sentiment of this text. Reply with JSON only: \
             {{\"label\": \"positive|negative|neutral\", \"score\": <-1..1>, \"confidence\": <0..1>}}\n\n{}",
            truncate_chars(text, PROMPT_TEXT_LIMIT)
        );
        let completion = self.client.generate(&self.model, &prompt).await?;
        let object = extract_json_object(&completion)?;
        let label = match object.get("label").and_then(Value::as_str) {
            Some(label) => match label.to_lowercase().as_str() {
                "positive" => SentimentLabel::Positive,
                "negative" => SentimentLabel::Negative,
                "neutral" => SentimentLabel::Neutral,
                other => {
                    return Err(AdapterError::InvalidResponse(format!(
                        "unknown sentiment label '{other}'"
                    )));
                }
            },
            None => return Err(AdapterError::InvalidResponse("missing label".into())),
        };
        let score = object
            .get("score")
            .and_then(Value::as_f64)
            .map(|score| (score as f32).clamp(-1.0, 1.0))
            .unwrap_or(0.0);
        Ok(AdapterOutput::new(
            FacetValue::Sentiment(Sentiment { label, score }),
            confidence_field(&object, 0.75),
        ))
    }
}

/// Topical category chosen by the model.
#[derive(Debug, Clone)]
pub struct OllamaCategory {
    client: OllamaClient,
    model: String,
}

impl OllamaCategory {
    /// Classify with `model`.
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl CapabilityAdapter for OllamaCategory {
    fn facet(&self) -> Facet {
        Facet::Category
    }

    fn method(&self) -> &str {
        "ollama_category"
    }

    fn cost(&self) -> Cost {
        Cost::Inference
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let prompt = format!(
            "Assign one news category (politics, business, sports, technology, health, science, \
             entertainment, crime, environment, general) to this article. Reply with JSON only: \
             {{\"category\": \"...\", \"confidence\": <0..1>}}\n\nKeywords: {}\n\n{}",
            input.keywords.join(", "),
            truncate_chars(input.analysis_text(), PROMPT_TEXT_LIMIT)
        );
        let completion = self.client.generate(&self.model, &prompt).await?;
        let object = extract_json_object(&completion)?;
        let category = object
            .get("category")
            .and_then(Value::as_str)
            .map(|category| category.trim().to_lowercase())
            .filter(|category| !category.is_empty())
            .ok_or_else(|| AdapterError::InvalidResponse("missing category".into()))?;
        Ok(AdapterOutput::new(
            FacetValue::Category(category),
            confidence_field(&object, 0.7),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn input() -> StageInput {
        StageInput {
            document_id: "doc".into(),
            raw_text: "Hola".into(),
            language: Some("es".into()),
            source_text: "El gobierno anunció nuevas medidas.".into(),
            ..StageInput::default()
        }
    }

    #[tokio::test]
    async fn translation_uses_generate_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .body_contains("\"stream\":false");
                then.status(200).json_body(json!({
                    "response": " The government announced new measures. ",
                    "done": true
                }));
            })
            .await;

        let adapter = OllamaTranslation::new(OllamaClient::new(server.base_url()), "llama");
        let output = adapter.invoke(&input()).await.expect("translation");

        mock.assert();
        let FacetValue::Translation(translation) = output.value else {
            panic!("expected translation");
        };
        assert_eq!(translation.text, "The government announced new measures.");
        assert_eq!(translation.source_language, "es");
        assert_eq!(adapter.cost(), Cost::Inference);
    }

    #[tokio::test]
    async fn error_status_is_reported_as_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let adapter = OllamaSummary::new(OllamaClient::new(server.base_url()), "llama", 50);
        let error = adapter.invoke(&input()).await.expect_err("error response");
        assert!(matches!(error, AdapterError::Failed(message) if message.contains("500")));
    }

    #[tokio::test]
    async fn missing_endpoint_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404);
            })
            .await;

        let adapter = OllamaCategory::new(OllamaClient::new(server.base_url()), "llama");
        let error = adapter.invoke(&input()).await.expect_err("404");
        assert!(matches!(error, AdapterError::Unavailable(_)));
    }

    #[tokio::test]
    async fn sentiment_parses_json_wrapped_in_prose() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "Sure! {\"label\": \"Negative\", \"score\": -0.6, \"confidence\": 0.9}",
                    "done": true
                }));
            })
            .await;

        let adapter = OllamaSentiment::new(OllamaClient::new(server.base_url()), "llama");
        let output = adapter.invoke(&input()).await.expect("sentiment");
        assert_eq!(
            output.value,
            FacetValue::Sentiment(Sentiment {
                label: SentimentLabel::Negative,
                score: -0.6,
            })
        );
        assert_eq!(output.confidence, 0.9);
    }

    #[tokio::test]
    async fn category_rejects_completion_without_json() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "I think it's sports.",
                    "done": true
                }));
            })
            .await;

        let adapter = OllamaCategory::new(OllamaClient::new(server.base_url()), "llama");
        let error = adapter.invoke(&input()).await.expect_err("no json");
        assert!(matches!(error, AdapterError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.1, 0.2, 0.3]] }));
            })
            .await;

        let client = OllamaClient::new(server.base_url());
        let vector = client.embed("nomic", "text").await.expect("vector");
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }
}
