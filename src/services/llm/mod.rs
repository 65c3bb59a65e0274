//! Chat and embedding providers behind a rate-limited, retrying client.

mod jina;
mod openai;

pub use jina::JinaBackend;
pub use openai::OpenAiCompatBackend;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use super::rate_limit::{RateLimiter, TokenUsage};
use crate::error::LlmError;
use crate::models::{
    ConversationEntry, EmbeddingConfig, EmbeddingProvider, LlmConfig, RateLimitConfig,
};
use crate::utils::retry::{RetryConfig, RetryResult, with_retry};

/// A chat request: the conversation plus optional sampling and tools.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ConversationEntry>,
    pub temperature: Option<f32>,
    pub tools: Option<Vec<Value>>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ConversationEntry>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = Some(tools);
        self
    }
}

/// JSON schema the model's reply must conform to.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// `None` when the provider returned no choices.
    pub message: Option<ConversationEntry>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub usage: TokenUsage,
}

/// One provider call.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Complete(&'a ChatRequest),
    Parse(&'a ChatRequest, &'a ResponseSchema),
    Embed(&'a [String]),
}

impl Operation<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Complete(_) => "complete",
            Operation::Parse(..) => "parse",
            Operation::Embed(_) => "embed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum OperationOutput {
    Chat(ChatResponse),
    Embeddings(EmbeddingResponse),
}

impl OperationOutput {
    pub fn usage(&self) -> &TokenUsage {
        match self {
            OperationOutput::Chat(r) => &r.usage,
            OperationOutput::Embeddings(r) => &r.usage,
        }
    }
}

/// A provider of chat completions and/or embeddings.
///
/// Operations a provider does not offer return `LlmError::Unsupported`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Provider name for logs and errors.
    fn provider(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let _ = request;
        Err(self.unsupported("complete"))
    }

    async fn parse(
        &self,
        request: &ChatRequest,
        schema: &ResponseSchema,
    ) -> Result<ChatResponse, LlmError> {
        let _ = (request, schema);
        Err(self.unsupported("parse"))
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingResponse, LlmError> {
        let _ = inputs;
        Err(self.unsupported("embed"))
    }

    fn unsupported(&self, operation: &str) -> LlmError {
        LlmError::Unsupported {
            provider: self.provider().to_string(),
            operation: operation.to_string(),
        }
    }
}

/// Wraps a backend with RPM/TPM throttling, bounded retry and usage counters.
pub struct RateLimitedClient {
    backend: Box<dyn LlmBackend>,
    limiter: RateLimiter,
    retry: RetryConfig,
}

impl RateLimitedClient {
    pub fn new(backend: Box<dyn LlmBackend>, limits: &RateLimitConfig, max_attempts: u32) -> Self {
        let retry = RetryConfig::new(max_attempts)
            .with_retry_delay(Duration::from_secs(limits.retry_delay_secs))
            .with_rate_limit_delay(Duration::from_secs(limits.rate_limit_delay_secs));
        Self {
            backend,
            limiter: RateLimiter::from_config(limits),
            retry,
        }
    }

    /// Chat client for the configured provider.
    pub fn chat_from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let backend = OpenAiCompatBackend::chat(config)?;
        Ok(Self::new(
            Box::new(backend),
            &config.limits,
            config.max_attempts,
        ))
    }

    /// Embedding client for the configured provider.
    pub fn embedding_from_config(config: &EmbeddingConfig) -> Result<Self, LlmError> {
        let backend: Box<dyn LlmBackend> = match config.provider {
            EmbeddingProvider::Jina => Box::new(JinaBackend::new(config)?),
            EmbeddingProvider::Mistral => Box::new(OpenAiCompatBackend::embeddings(config)?),
        };
        Ok(Self::new(backend, &config.limits, config.max_attempts))
    }

    pub fn provider(&self) -> &str {
        self.backend.provider()
    }

    /// Cumulative token usage of successful calls.
    pub fn usage(&self) -> TokenUsage {
        self.limiter.usage()
    }

    /// Run one operation, waiting on rate limits and retrying transient failures.
    pub async fn invoke(&self, operation: Operation<'_>) -> Result<OperationOutput, LlmError> {
        let result = with_retry(&self.retry, move |attempt| async move {
            self.limiter.acquire().await;
            debug!(
                provider = self.backend.provider(),
                operation = operation.name(),
                attempt,
                "invoking provider"
            );
            match operation {
                Operation::Complete(request) => {
                    self.backend.complete(request).await.map(OperationOutput::Chat)
                }
                Operation::Parse(request, schema) => self
                    .backend
                    .parse(request, schema)
                    .await
                    .map(OperationOutput::Chat),
                Operation::Embed(inputs) => self
                    .backend
                    .embed(inputs)
                    .await
                    .map(OperationOutput::Embeddings),
            }
        })
        .await;

        match result {
            RetryResult::Success { value, .. } => {
                self.limiter.record(value.usage());
                Ok(value)
            }
            RetryResult::Failed {
                last_error,
                attempts,
            } => {
                error!(
                    provider = self.backend.provider(),
                    operation = operation.name(),
                    attempts,
                    error = %last_error,
                    "provider call failed"
                );
                Err(last_error)
            }
        }
    }

    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        match self.invoke(Operation::Complete(request)).await? {
            OperationOutput::Chat(response) => Ok(response),
            OperationOutput::Embeddings(_) => Err(self.mismatched("complete")),
        }
    }

    /// Structured output: the reply content is decoded as `T`.
    pub async fn parse<T: DeserializeOwned>(
        &self,
        request: &ChatRequest,
        schema: &ResponseSchema,
    ) -> Result<T, LlmError> {
        let response = match self.invoke(Operation::Parse(request, schema)).await? {
            OperationOutput::Chat(response) => response,
            OperationOutput::Embeddings(_) => return Err(self.mismatched("parse")),
        };

        let content = response
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.provider().to_string(),
                message: "structured response has no content".to_string(),
            })?;

        serde_json::from_str(&content).map_err(|e| LlmError::InvalidResponse {
            provider: self.provider().to_string(),
            message: format!("structured response does not match schema: {}", e),
        })
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<EmbeddingResponse, LlmError> {
        match self.invoke(Operation::Embed(inputs)).await? {
            OperationOutput::Embeddings(response) => Ok(response),
            OperationOutput::Chat(_) => Err(self.mismatched("embed")),
        }
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let response = self.embed(&[text.to_string()]).await?;
        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.provider().to_string(),
                message: "empty embedding response".to_string(),
            })
    }

    fn mismatched(&self, operation: &str) -> LlmError {
        LlmError::InvalidResponse {
            provider: self.provider().to_string(),
            message: format!("unexpected output for {} operation", operation),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backends for unit tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Replays queued chat responses and records every request it sees.
    #[derive(Default)]
    pub struct ScriptedBackend {
        pub chat: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
        pub requests: Arc<Mutex<Vec<ChatRequest>>>,
        pub embedding: Vec<f32>,
    }

    impl ScriptedBackend {
        pub fn with_replies(replies: Vec<ConversationEntry>) -> Self {
            Self {
                chat: Mutex::new(
                    replies
                        .into_iter()
                        .map(|m| Ok(chat_response(m)))
                        .collect(),
                ),
                ..Default::default()
            }
        }

        pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
            self.embedding = embedding;
            self
        }
    }

    pub fn chat_response(message: ConversationEntry) -> ChatResponse {
        ChatResponse {
            message: Some(message),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        fn provider(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.chat
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(self.unsupported("complete")))
        }

        async fn parse(
            &self,
            request: &ChatRequest,
            _schema: &ResponseSchema,
        ) -> Result<ChatResponse, LlmError> {
            self.complete(request).await
        }

        async fn embed(&self, inputs: &[String]) -> Result<EmbeddingResponse, LlmError> {
            Ok(EmbeddingResponse {
                embeddings: inputs.iter().map(|_| self.embedding.clone()).collect(),
                usage: TokenUsage {
                    prompt_tokens: inputs.len() as u64,
                    completion_tokens: 0,
                    total_tokens: inputs.len() as u64,
                },
            })
        }
    }

    /// Client over a scripted backend with no throttling and instant retries.
    pub fn client(backend: ScriptedBackend) -> RateLimitedClient {
        let limits = RateLimitConfig {
            requests_per_minute: 0,
            tokens_per_minute: 0,
            retry_delay_secs: 0,
            rate_limit_delay_secs: 0,
        };
        RateLimitedClient::new(Box::new(backend), &limits, 2)
    }
}
