//! OpenAI-compatible chat and embeddings backend (Mistral, Azure OpenAI, OpenAI).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ChatRequest, ChatResponse, EmbeddingResponse, LlmBackend, ResponseSchema};
use crate::error::LlmError;
use crate::models::{
    ConversationEntry, DEFAULT_EMBED_MODEL, DEFAULT_JINA_URL, DEFAULT_MISTRAL_URL,
    EmbeddingConfig, LlmConfig, LlmProvider,
};
use crate::services::rate_limit::TokenUsage;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";
const DEFAULT_MISTRAL_EMBED_MODEL: &str = "mistral-embed";

#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    /// Azure's `api-key` header plus `api-version` query parameter.
    Azure { key: String, api_version: String },
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ConversationEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatBodyResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ConversationEntry,
}

#[derive(Debug, Serialize)]
struct EmbedBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedBodyResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Backend speaking the `/chat/completions` and `/embeddings` wire format.
#[derive(Debug, Clone)]
pub struct OpenAiCompatBackend {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    auth: Auth,
}

impl OpenAiCompatBackend {
    /// Chat backend for the configured provider.
    pub fn chat(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match config.provider {
            LlmProvider::Openai if config.base_url == DEFAULT_MISTRAL_URL => {
                DEFAULT_OPENAI_URL.to_string()
            }
            _ => config.base_url.clone(),
        };
        Self::build(
            config.provider,
            &base_url,
            &config.chat_model,
            config.api_key.as_deref(),
            config.api_version.as_deref(),
            config.timeout_secs,
        )
    }

    /// Mistral embeddings backend.
    pub fn embeddings(config: &EmbeddingConfig) -> Result<Self, LlmError> {
        let base_url = if config.base_url == DEFAULT_JINA_URL {
            DEFAULT_MISTRAL_URL
        } else {
            config.base_url.as_str()
        };
        let model = if config.model == DEFAULT_EMBED_MODEL {
            DEFAULT_MISTRAL_EMBED_MODEL
        } else {
            config.model.as_str()
        };
        Self::build(
            LlmProvider::Mistral,
            base_url,
            model,
            config.api_key.as_deref(),
            None,
            config.timeout_secs,
        )
    }

    fn build(
        provider: LlmProvider,
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        api_version: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingCredentials(provider.to_string()))?
            .trim()
            .to_string();

        let auth = match provider {
            LlmProvider::AzureOpenai => Auth::Azure {
                key,
                api_version: api_version.unwrap_or(DEFAULT_AZURE_API_VERSION).to_string(),
            },
            LlmProvider::Mistral | LlmProvider::Openai => Auth::Bearer(key),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError {
                provider: provider.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            auth,
        })
    }

    /// Azure routes by deployment name in the path instead of a `model` field.
    fn endpoint(&self, path: &str) -> String {
        match self.auth {
            Auth::Azure { .. } => format!(
                "{}/openai/deployments/{}/{}",
                self.base_url, self.model, path
            ),
            Auth::Bearer(_) => format!("{}/{}", self.base_url, path),
        }
    }

    fn model_field(&self) -> Option<&str> {
        match self.auth {
            Auth::Azure { .. } => None,
            Auth::Bearer(_) => Some(&self.model),
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(self.endpoint(path));
        match &self.auth {
            Auth::Bearer(key) => request.bearer_auth(key),
            Auth::Azure { key, api_version } => request
                .header("api-key", key)
                .query(&[("api-version", api_version)]),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, LlmError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else if e.is_connect() {
                LlmError::ConnectionError {
                    provider: self.provider.to_string(),
                    message: e.to_string(),
                }
            } else {
                LlmError::RequestError {
                    provider: self.provider.to_string(),
                    source: e,
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ServerError {
                provider: self.provider.to_string(),
                status,
                body,
            });
        }

        Ok(response)
    }

    async fn chat_completion(
        &self,
        request: &ChatRequest,
        response_format: Option<Value>,
    ) -> Result<ChatResponse, LlmError> {
        let tools = request.tools.as_deref();
        let body = ChatBody {
            model: self.model_field(),
            messages: &request.messages,
            temperature: request.temperature,
            tools,
            tool_choice: tools.map(|_| "auto"),
            response_format,
        };

        let response = self.send(self.post("chat/completions").json(&body)).await?;
        let parsed: ChatBodyResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    provider: self.provider.to_string(),
                    message: e.to_string(),
                })?;

        Ok(ChatResponse {
            message: parsed.choices.into_iter().next().map(|c| c.message),
            usage: parsed.usage,
        })
    }
}

/// `response_format` body for structured output.
fn json_schema_format(schema: &ResponseSchema) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": schema.name,
            "schema": schema.schema,
            "strict": true,
        }
    })
}

#[async_trait]
impl LlmBackend for OpenAiCompatBackend {
    fn provider(&self) -> &str {
        match self.provider {
            LlmProvider::Mistral => "mistral",
            LlmProvider::AzureOpenai => "azure-openai",
            LlmProvider::Openai => "openai",
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.chat_completion(request, None).await
    }

    async fn parse(
        &self,
        request: &ChatRequest,
        schema: &ResponseSchema,
    ) -> Result<ChatResponse, LlmError> {
        self.chat_completion(request, Some(json_schema_format(schema)))
            .await
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingResponse, LlmError> {
        let body = EmbedBody {
            model: self.model_field(),
            input: inputs,
        };
        let response = self.send(self.post("embeddings").json(&body)).await?;
        let mut parsed: EmbedBodyResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    provider: self.provider.to_string(),
                    message: e.to_string(),
                })?;

        parsed.data.sort_by_key(|d| d.index);
        Ok(EmbeddingResponse {
            embeddings: parsed.data.into_iter().map(|d| d.embedding).collect(),
            usage: parsed.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm_config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = LlmConfig::default();
        let err = OpenAiCompatBackend::chat(&config).unwrap_err();
        assert!(matches!(err, LlmError::MissingCredentials(_)));
    }

    #[test]
    fn test_mistral_endpoint() {
        let backend = OpenAiCompatBackend::chat(&llm_config(LlmProvider::Mistral)).unwrap();
        assert_eq!(
            backend.endpoint("chat/completions"),
            "https://api.mistral.ai/v1/chat/completions"
        );
        assert_eq!(backend.model_field(), Some("mistral-small-latest"));
    }

    #[test]
    fn test_openai_uses_its_own_default_url() {
        let backend = OpenAiCompatBackend::chat(&llm_config(LlmProvider::Openai)).unwrap();
        assert_eq!(
            backend.endpoint("embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[test]
    fn test_azure_deployment_endpoint() {
        let mut config = llm_config(LlmProvider::AzureOpenai);
        config.base_url = "https://example.openai.azure.com/".to_string();
        config.chat_model = "gpt-4.1".to_string();
        let backend = OpenAiCompatBackend::chat(&config).unwrap();

        assert_eq!(
            backend.endpoint("chat/completions"),
            "https://example.openai.azure.com/openai/deployments/gpt-4.1/chat/completions"
        );
        assert!(backend.model_field().is_none());
        assert_eq!(backend.provider(), "azure-openai");
    }

    #[test]
    fn test_mistral_embeddings_defaults() {
        let config = EmbeddingConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let backend = OpenAiCompatBackend::embeddings(&config).unwrap();
        assert_eq!(
            backend.endpoint("embeddings"),
            "https://api.mistral.ai/v1/embeddings"
        );
        assert_eq!(backend.model_field(), Some("mistral-embed"));
    }

    #[test]
    fn test_chat_body_shape() {
        let messages = vec![ConversationEntry::user("hi")];
        let tools = vec![json!({"type": "function"})];
        let body = ChatBody {
            model: Some("m"),
            messages: &messages,
            temperature: Some(0.7),
            tools: Some(&tools),
            tool_choice: Some("auto"),
            response_format: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["tool_choice"], "auto");
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn test_chat_response_with_tool_calls() {
        let parsed: ChatBodyResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_0",
                        "type": "function",
                        "function": {"name": "get_context", "arguments": "{\"search_query\": \"q\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        }))
        .unwrap();

        let message = &parsed.choices[0].message;
        assert!(message.has_tool_calls());
        assert_eq!(parsed.usage.total_tokens, 5);
    }

    #[test]
    fn test_json_schema_format() {
        let schema = ResponseSchema::new("chunking_evaluation", json!({"type": "object"}));
        let format = json_schema_format(&schema);
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "chunking_evaluation");
    }
}
