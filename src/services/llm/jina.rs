//! Jina AI embeddings backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EmbeddingResponse, LlmBackend};
use crate::error::LlmError;
use crate::models::EmbeddingConfig;
use crate::services::rate_limit::TokenUsage;

const PROVIDER: &str = "jina";

#[derive(Debug, Serialize)]
struct JinaInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct JinaRequest<'a> {
    model: &'a str,
    input: Vec<JinaInput<'a>>,
}

#[derive(Debug, Default, Deserialize)]
struct JinaUsage {
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct JinaVector {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct JinaResponse {
    #[serde(default)]
    usage: JinaUsage,
    #[serde(default)]
    data: Vec<JinaVector>,
}

impl From<JinaResponse> for EmbeddingResponse {
    fn from(mut response: JinaResponse) -> Self {
        response.data.sort_by_key(|v| v.index);
        EmbeddingResponse {
            embeddings: response.data.into_iter().map(|v| v.embedding).collect(),
            usage: TokenUsage {
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: 0,
                total_tokens: response.usage.total_tokens,
            },
        }
    }
}

/// Embeddings-only backend; chat operations are unsupported.
#[derive(Debug, Clone)]
pub struct JinaBackend {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl JinaBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::MissingCredentials(PROVIDER.to_string()))?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmBackend for JinaBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingResponse, LlmError> {
        let body = JinaRequest {
            model: &self.model,
            input: inputs.iter().map(|text| JinaInput { text }).collect(),
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::RequestError {
                        provider: PROVIDER.to_string(),
                        source: e,
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ServerError {
                provider: PROVIDER.to_string(),
                status,
                body,
            });
        }

        let parsed: JinaResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    message: e.to_string(),
                })?;

        Ok(parsed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::ChatRequest;
    use serde_json::json;

    fn config() -> EmbeddingConfig {
        EmbeddingConfig {
            api_key: Some(" jina-key ".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_shape() {
        let inputs = vec!["a".to_string(), "b".to_string()];
        let body = JinaRequest {
            model: "jina-clip-v2",
            input: inputs.iter().map(|text| JinaInput { text }).collect(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"model": "jina-clip-v2", "input": [{"text": "a"}, {"text": "b"}]})
        );
    }

    #[test]
    fn test_response_ordered_by_index() {
        let parsed: JinaResponse = serde_json::from_value(json!({
            "usage": {"total_tokens": 7, "prompt_tokens": 7},
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ]
        }))
        .unwrap();

        let response: EmbeddingResponse = parsed.into();
        assert_eq!(response.embeddings[0], vec![1.0, 0.0]);
        assert_eq!(response.usage.total_tokens, 7);
        assert_eq!(response.usage.completion_tokens, 0);
    }

    #[test]
    fn test_key_is_trimmed_and_required() {
        let backend = JinaBackend::new(&config()).unwrap();
        assert_eq!(backend.api_key, "jina-key");
        assert_eq!(backend.url, "https://api.jina.ai/v1/embeddings");

        let missing = EmbeddingConfig::default();
        assert!(matches!(
            JinaBackend::new(&missing),
            Err(LlmError::MissingCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_chat_is_unsupported() {
        let backend = JinaBackend::new(&config()).unwrap();
        let err = backend.complete(&ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, LlmError::Unsupported { .. }));
    }
}
