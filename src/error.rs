//! Error types for docrag.

use thiserror::Error;

use crate::services::chunker::ChunkStrategy;
use crate::utils::retry::Retryable;

/// Errors raised by chat and embedding providers.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to connect to {provider}: {message}")]
    ConnectionError { provider: String, message: String },

    #[error("{provider} returned status {status}: {body}")]
    ServerError {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("request to {provider} failed: {source}")]
    RequestError {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{provider} does not support the {operation} operation")]
    Unsupported { provider: String, operation: String },

    #[error("missing credentials for {0}")]
    MissingCredentials(String),

    #[error("request timed out")]
    Timeout,
}

impl LlmError {
    /// HTTP status carried by a server error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::ServerError { status, .. } => Some(*status),
            LlmError::RequestError { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        if self.is_rate_limited() {
            return true;
        }
        match self {
            LlmError::ConnectionError { .. } | LlmError::Timeout => true,
            LlmError::ServerError { status, .. } => *status == 429 || *status >= 500,
            LlmError::RequestError { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            LlmError::InvalidResponse { .. }
            | LlmError::Unsupported { .. }
            | LlmError::MissingCredentials(_) => false,
        }
    }

    fn is_rate_limited(&self) -> bool {
        if self.status() == Some(429) {
            return true;
        }
        match self {
            LlmError::ServerError { body, .. } => {
                let body = body.to_lowercase();
                body.contains("rate limit") || body.contains("token limit")
            }
            _ => false,
        }
    }
}

/// Errors raised by the OCR service client.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("OCR request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("OCR service returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("invalid OCR response: {0}")]
    InvalidResponse(String),

    #[error("missing OCR API key")]
    MissingCredentials,
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("dimension mismatch for collection '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: u64,
        actual: u64,
    },

    #[error("chunk {0} has no embedding")]
    MissingEmbedding(u64),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionError(_) => true,
            VectorStoreError::UpsertError(msg) | VectorStoreError::QueryError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
            }
            _ => false,
        }
    }
}

/// Errors related to chunking.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("document has no pages")]
    NoPages,

    #[error("page merge check failed: {0}")]
    MergeCheck(#[from] LlmError),

    #[error("invalid merge evaluation: {0}")]
    InvalidEvaluation(String),

    #[error("{0} chunking requires a chat model")]
    ModelRequired(ChunkStrategy),
}

/// Errors raised while resolving or running an agent tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool {0} not found in tool registry.")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("empty response: {0}")]
    EmptyResponse(String),
}

/// Errors raised by the conversation loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("chat model error: {0}")]
    Llm(#[from] LlmError),

    #[error("model returned no choices")]
    EmptyResponse,

    #[error("no final answer after {0} model calls")]
    MaxIterations(usize),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors raised by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing input for step {step}: {message}")]
    MissingInput { step: String, message: String },

    #[error("invalid step range: {0}")]
    InvalidStepRange(String),

    #[error("step {step} needs {component}, which is not configured")]
    MissingComponent {
        step: String,
        component: &'static str,
    },

    #[error("no chunks with embeddings to store")]
    NoEmbeddings,

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Llm(#[from] LlmError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(status: u16, body: &str) -> LlmError {
        LlmError::ServerError {
            provider: "test".to_string(),
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_server_errors_retryable() {
        assert!(server_error(503, "unavailable").is_retryable());
        assert!(server_error(429, "slow down").is_retryable());
        assert!(!server_error(401, "unauthorized").is_retryable());
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(server_error(429, "").is_rate_limited());
        assert!(server_error(400, "Token limit exceeded for model").is_rate_limited());
        assert!(server_error(400, "Token limit exceeded for model").is_retryable());
        assert!(!server_error(400, "bad request").is_retryable());
        assert!(!server_error(500, "internal").is_rate_limited());
    }

    #[test]
    fn test_unsupported_not_retryable() {
        let err = LlmError::Unsupported {
            provider: "jina".to_string(),
            operation: "complete".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "jina does not support the complete operation"
        );
    }

    #[test]
    fn test_unknown_tool_message() {
        let err = ToolError::UnknownTool("web_search".to_string());
        assert_eq!(err.to_string(), "Tool web_search not found in tool registry.");
    }
}
