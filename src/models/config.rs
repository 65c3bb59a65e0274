use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;
use crate::services::chunker::ChunkStrategy;

pub const DEFAULT_MISTRAL_URL: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_JINA_URL: &str = "https://api.jina.ai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "mistral-small-latest";
pub const DEFAULT_EMBED_MODEL: &str = "jina-clip-v2";
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";
pub const DEFAULT_EMBEDDING_DIMENSION: u64 = 1024;
pub const DEFAULT_LOCAL_DB_PATH: &str = "data/qdrant";
pub const DEFAULT_PROCESSED_DIR: &str = "data/processed";
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8000";

const PROJECT_CONFIG_FILE: &str = "docrag.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("docrag").join("config.toml"))
    }

    pub fn project_path() -> PathBuf {
        PathBuf::from(PROJECT_CONFIG_FILE)
    }

    /// Path of the config file that `load` would read, if any exists.
    pub fn active_path() -> Option<PathBuf> {
        let project = Self::project_path();
        if project.exists() {
            return Some(project);
        }
        Self::global_path().filter(|p| p.exists())
    }

    /// Load the config file (project first, then global), then `.env` and
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match Self::active_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides. Secrets are only read from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match self.llm.provider {
            LlmProvider::Mistral => {
                if let Some(key) = non_empty("MISTRAL_API_KEY") {
                    self.llm.api_key = Some(key);
                }
            }
            LlmProvider::AzureOpenai => {
                if let Some(key) = non_empty("AZURE_OPENAI_API_KEY") {
                    self.llm.api_key = Some(key);
                }
                if let Some(endpoint) = non_empty("AZURE_OPENAI_ENDPOINT") {
                    self.llm.base_url = endpoint;
                }
                if let Some(version) = non_empty("AZURE_OPENAI_API_VERSION") {
                    self.llm.api_version = Some(version);
                }
            }
            LlmProvider::Openai => {
                if let Some(key) = non_empty("OPENAI_API_KEY") {
                    self.llm.api_key = Some(key);
                }
            }
        }

        match self.embedding.provider {
            EmbeddingProvider::Jina => {
                if let Some(key) = non_empty("JINAAI_API_KEY") {
                    self.embedding.api_key = Some(key);
                }
            }
            EmbeddingProvider::Mistral => {
                if let Some(key) = non_empty("MISTRAL_API_KEY") {
                    self.embedding.api_key = Some(key);
                }
            }
        }

        if let Some(key) = non_empty("MISTRAL_API_KEY") {
            self.ocr.api_key = Some(key);
        }

        if let Some(url) = non_empty("QDRANT_URL") {
            self.vector_store.url = Some(match non_empty("QDRANT_PORT") {
                Some(port) => format!("{}:{}", url.trim_end_matches('/'), port),
                None => url,
            });
        }
        if let Some(key) = non_empty("QDRANT_API_KEY") {
            self.vector_store.api_key = Some(key);
        }
        if let Some(path) = non_empty("QDRANT_PATH_TO_DB") {
            self.vector_store.local_path = PathBuf::from(path);
        }

        if let Some(level) = non_empty("DOCRAG_LOG") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        if r.min_limit == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.min_limit must be at least 1".to_string(),
            ));
        }
        if r.min_limit > r.max_limit {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.min_limit ({}) exceeds retrieval.max_limit ({})",
                r.min_limit, r.max_limit
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.llm.max_attempts == 0 || self.embedding.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Chat/completion provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmProvider {
    #[default]
    Mistral,
    AzureOpenai,
    Openai,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Mistral => write!(f, "mistral"),
            LlmProvider::AzureOpenai => write!(f, "azure-openai"),
            LlmProvider::Openai => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    #[serde(default = "default_mistral_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Azure OpenAI `api-version` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(skip)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub limits: RateLimitConfig,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_mistral_url() -> String {
    DEFAULT_MISTRAL_URL.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: default_mistral_url(),
            chat_model: default_chat_model(),
            api_version: None,
            api_key: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout(),
            limits: RateLimitConfig::default(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Requests-per-minute and tokens-per-minute ceilings, plus retry waits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_tokens_per_minute")]
    pub tokens_per_minute: u64,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay_secs: u64,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_tokens_per_minute() -> u64 {
    500_000
}

fn default_retry_delay() -> u64 {
    10
}

fn default_rate_limit_delay() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            tokens_per_minute: default_tokens_per_minute(),
            retry_delay_secs: default_retry_delay(),
            rate_limit_delay_secs: default_rate_limit_delay(),
        }
    }
}

/// Embedding provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProvider {
    #[default]
    Jina,
    Mistral,
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Jina => write!(f, "jina"),
            EmbeddingProvider::Mistral => write!(f, "mistral"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_jina_url")]
    pub base_url: String,

    #[serde(default = "default_embed_model")]
    pub model: String,

    /// Output width of the embedding model; collections are created with it.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: u64,

    #[serde(skip)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_embedding_limits")]
    pub limits: RateLimitConfig,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_jina_url() -> String {
    DEFAULT_JINA_URL.to_string()
}

fn default_embed_model() -> String {
    DEFAULT_EMBED_MODEL.to_string()
}

fn default_embedding_dimension() -> u64 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_batch_size() -> u32 {
    1
}

fn default_embedding_limits() -> RateLimitConfig {
    RateLimitConfig {
        requests_per_minute: 500,
        tokens_per_minute: 1_000_000,
        ..Default::default()
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            base_url: default_jina_url(),
            model: default_embed_model(),
            dimension: default_embedding_dimension(),
            api_key: None,
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            limits: default_embedding_limits(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_mistral_url")]
    pub base_url: String,

    #[serde(default = "default_ocr_model")]
    pub model: String,

    #[serde(skip)]
    pub api_key: Option<String>,

    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

fn default_ocr_model() -> String {
    DEFAULT_OCR_MODEL.to_string()
}

fn default_ocr_timeout() -> u64 {
    600
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            base_url: default_mistral_url(),
            model: default_ocr_model(),
            api_key: None,
            timeout_secs: default_ocr_timeout(),
        }
    }
}

/// Distance metric used by a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Dot => write!(f, "dot"),
            DistanceMetric::Euclid => write!(f, "euclid"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" => Ok(DistanceMetric::Dot),
            "euclid" | "euclidean" => Ok(DistanceMetric::Euclid),
            _ => Err(format!("unknown distance metric: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Remote Qdrant URL including port. When unset, the local on-disk store is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip)]
    pub api_key: Option<String>,

    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    #[serde(default)]
    pub distance: DistanceMetric,
}

fn default_local_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOCAL_DB_PATH)
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            local_path: default_local_path(),
            distance: DistanceMetric::default(),
        }
    }
}

impl VectorStoreConfig {
    pub fn driver_name(&self) -> &'static str {
        if self.url.is_some() { "qdrant" } else { "local" }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_min_limit")]
    pub min_limit: u64,

    #[serde(default = "default_max_limit")]
    pub max_limit: u64,

    /// Limit used by `get_context` when the model omits one.
    #[serde(default = "default_min_limit")]
    pub default_limit: u64,

    /// Collection queried by the agent; usually the OCR file id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

fn default_min_limit() -> u64 {
    3
}

fn default_max_limit() -> u64 {
    20
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_limit: default_min_limit(),
            max_limit: default_max_limit(),
            default_limit: default_min_limit(),
            collection: None,
        }
    }
}

impl RetrievalConfig {
    /// Clamp a caller-supplied limit into `[min_limit, max_limit]`.
    pub fn clamp_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(self.min_limit, self.max_limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,

    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,

    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

fn default_overlap_chars() -> usize {
    1000
}

fn default_max_chunk_chars() -> usize {
    20_000
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            overlap_chars: default_overlap_chars(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Overrides the built-in routing system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> usize {
    8
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PROCESSED_DIR)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("tmp")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            processed_dir: default_processed_dir(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,

    /// Pause between a tool notice and the tool run, in milliseconds.
    #[serde(default = "default_notice_delay")]
    pub notice_delay_ms: u64,
}

fn default_server_addr() -> String {
    DEFAULT_SERVER_ADDR.to_string()
}

fn default_notice_delay() -> u64 {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            notice_delay_ms: default_notice_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            default_format: OutputFormat::Text,
        }
    }
}
