use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_ADAPTER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_COMMIT_MAX_RETRIES: usize = 3;
const DEFAULT_SUMMARY_MAX_WORDS: usize = 120;
const DEFAULT_KEYWORD_LIMIT: usize = 12;

/// Runtime configuration for the enrichment pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one JSON file per document. `None` keeps documents in memory.
    pub store_dir: Option<PathBuf>,
    /// Base URL of an Ollama runtime. When unset only the local heuristic adapters are wired.
    pub ollama_url: Option<String>,
    /// Generation model used for translation, summary, sentiment, and category prompts.
    pub ollama_model: String,
    /// Embedding model passed to the Ollama embed endpoint.
    pub embedding_model: String,
    /// Dimensionality of the produced search vectors.
    pub embedding_dimension: usize,
    /// Per-call timeout for cheap, local adapters.
    pub adapter_timeout: Duration,
    /// Per-call timeout for model-backed adapters.
    pub inference_timeout: Duration,
    /// Number of re-read/re-merge attempts after a conflicting commit.
    pub commit_max_retries: usize,
    /// Word budget for generated summaries.
    pub summary_max_words: usize,
    /// Maximum number of keywords kept per document.
    pub keyword_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: None,
            ollama_url: None,
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            adapter_timeout: Duration::from_millis(DEFAULT_ADAPTER_TIMEOUT_MS),
            inference_timeout: Duration::from_millis(DEFAULT_INFERENCE_TIMEOUT_MS),
            commit_max_retries: DEFAULT_COMMIT_MAX_RETRIES,
            summary_max_words: DEFAULT_SUMMARY_MAX_WORDS,
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let embedding_dimension =
            parse_optional("EMBEDDING_DIMENSION")?.unwrap_or(defaults.embedding_dimension);
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()));
        }

        Ok(Self {
            store_dir: load_env_optional("FACETFLOW_STORE_DIR").map(PathBuf::from),
            ollama_url: load_env_optional("OLLAMA_URL"),
            ollama_model: load_env_optional("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension,
            adapter_timeout: parse_optional("ADAPTER_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.adapter_timeout),
            inference_timeout: parse_optional("INFERENCE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.inference_timeout),
            commit_max_retries: parse_optional("COMMIT_MAX_RETRIES")?
                .unwrap_or(defaults.commit_max_retries),
            summary_max_words: parse_optional("SUMMARY_MAX_WORDS")?
                .unwrap_or(defaults.summary_max_words),
            keyword_limit: parse_optional("KEYWORD_LIMIT")?.unwrap_or(defaults.keyword_limit),
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment and install it in the global cache.
///
/// Repeated calls keep the first loaded configuration.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(config) = get_config() {
        return Ok(config);
    }
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        store_dir = ?config.store_dir,
        ollama_url = ?config.ollama_url,
        ollama_model = %config.ollama_model,
        embedding_dimension = config.embedding_dimension,
        commit_max_retries = config.commit_max_retries,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
