//! Tools the conversation agent can call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::llm::{ChatRequest, RateLimitedClient};
use super::vector_store::VectorStoreGateway;
use crate::error::ToolError;
use crate::models::{ConversationEntry, ScoredPoint};

const MATH_REASONING_SYSTEM_TEMPLATE: &str = "Il tuo compito è quello di scrivere il procedimento logico necessario ad ottenere un risultato numerico.
Non concentrarti sul'output finale, ma sul procedimento.

Considera quanto segue per rispondere alla domanda:
{context}
";

/// The closed set of tools offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    MathReasoning,
    GetContext,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::MathReasoning, Tool::GetContext];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::MathReasoning => "math_reasoning",
            Tool::GetContext => "get_context",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Function schema in the OpenAI `tools` format.
    pub fn schema(&self) -> Value {
        match self {
            Tool::MathReasoning => json!({
                "type": "function",
                "function": {
                    "name": self.name(),
                    "description": "Use this tool to approach the problem using mathematical reasoning.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "question": {
                                "type": "string",
                                "description": "The question to be answered."
                            },
                            "context": {
                                "type": "string",
                                "description": "Contextual information to help answer the question."
                            }
                        },
                        "required": ["question", "context"]
                    }
                }
            }),
            Tool::GetContext => json!({
                "type": "function",
                "function": {
                    "name": self.name(),
                    "description": "Use this tool to search for information in the vector store. Query search expands user input with an hypothetical answer to increase cosine similarity.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "search_query": {
                                "type": "string",
                                "description": "Expanded sentence generated from user input to increase cosine similarity."
                            },
                            "limit": {
                                "type": "integer",
                                "description": "Max number of results to return, usually 3-5 are enough. Keep it higher for abstractive queries, lower for extractive (factual) queries."
                            }
                        },
                        "required": ["search_query"]
                    }
                }
            }),
        }
    }

    pub fn schemas() -> Vec<Value> {
        Self::ALL.iter().map(Tool::schema).collect()
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Deserialize)]
struct MathReasoningArgs {
    question: String,
    context: String,
}

#[derive(Debug, Deserialize)]
struct GetContextArgs {
    search_query: String,
    #[serde(default)]
    limit: Option<u64>,
}

/// A retrieved chunk as returned to the model.
#[derive(Debug, Clone, Serialize)]
struct ContextHit {
    id: u64,
    score: f32,
    payload: serde_json::Map<String, Value>,
}

impl From<ScoredPoint> for ContextHit {
    fn from(point: ScoredPoint) -> Self {
        Self {
            id: point.id,
            score: point.score,
            payload: point.payload,
        }
    }
}

/// Runs tool calls against the chat model, the embedder and one collection.
pub struct ToolClient {
    chat: Arc<RateLimitedClient>,
    embeddings: Arc<RateLimitedClient>,
    store: Arc<VectorStoreGateway>,
    collection: String,
}

impl ToolClient {
    pub fn new(
        chat: Arc<RateLimitedClient>,
        embeddings: Arc<RateLimitedClient>,
        store: Arc<VectorStoreGateway>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            embeddings,
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Execute a tool call and render its outcome for the conversation.
    ///
    /// Failures become error text so the model can react to them.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = Tool::from_name(name) else {
            let err = ToolError::UnknownTool(name.to_string());
            tracing::warn!(tool = name, "{}", err);
            return err.to_string();
        };

        tracing::debug!(%tool, arguments, "calling tool");
        match self.run(tool, arguments).await {
            Ok(result) => {
                let rendered =
                    serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
                tracing::debug!(%tool, result = %rendered, "tool finished");
                rendered
            }
            Err(e) => {
                tracing::warn!(%tool, error = %e, "tool failed");
                format!("Error executing tool {}: {}", name, e)
            }
        }
    }

    pub async fn run(&self, tool: Tool, arguments: &str) -> Result<Value, ToolError> {
        match tool {
            Tool::MathReasoning => {
                let args: MathReasoningArgs = serde_json::from_str(arguments)?;
                self.math_reasoning(&args.question, &args.context)
                    .await
                    .map(Value::String)
            }
            Tool::GetContext => {
                let args: GetContextArgs = serde_json::from_str(arguments)?;
                let hits = self.get_context(&args.search_query, args.limit).await?;
                Ok(serde_json::to_value(hits)?)
            }
        }
    }

    /// Ask the chat model for the reasoning steps toward a numeric answer.
    pub async fn math_reasoning(&self, question: &str, context: &str) -> Result<String, ToolError> {
        let request = ChatRequest::new(vec![
            ConversationEntry::system(MATH_REASONING_SYSTEM_TEMPLATE.replace("{context}", context)),
            ConversationEntry::user(question),
        ]);
        let response = self.chat.complete(&request).await?;
        response
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| ToolError::EmptyResponse(Tool::MathReasoning.name().to_string()))
    }

    /// Embed the query and fetch the closest chunks, best first.
    async fn get_context(
        &self,
        search_query: &str,
        limit: Option<u64>,
    ) -> Result<Vec<ContextHit>, ToolError> {
        let limit = limit.or(Some(self.store.retrieval().default_limit));
        let vector = self.embeddings.embed_one(search_query).await?;
        let results = self
            .store
            .query(&self.collection, vector, limit, true)
            .await?;

        tracing::debug!(
            collection = %self.collection,
            hits = results.len(),
            "retrieved context"
        );
        Ok(results.into_iter().map(ContextHit::from).collect())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::services::llm::testing::ScriptedBackend;
    use tempfile::TempDir;

    #[test]
    fn test_tool_names_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("web_search"), None);
    }

    #[test]
    fn test_get_context_schema_requires_query() {
        let schema = Tool::GetContext.schema();
        assert_eq!(
            schema["function"]["parameters"]["required"],
            json!(["search_query"])
        );
        assert_eq!(Tool::schemas().len(), 2);
    }

    #[tokio::test]
    async fn test_get_context_returns_ranked_hits() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = tool_client(ScriptedBackend::default(), seeded_store(&dir).await);

        let result = tools
            .execute("get_context", r#"{"search_query": "first"}"#)
            .await;
        let hits: Vec<Value> = serde_json::from_str(&result).unwrap();

        // Limit defaults to 3 and the closest point to [1.0, 0.1] comes first.
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0]["id"], 0);
        assert_eq!(hits[0]["payload"]["text"], "chunk 0");
        assert!(result.contains('\n'));
    }

    #[tokio::test]
    async fn test_math_reasoning_embeds_context() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::with_replies(vec![ConversationEntry::assistant(
            Some("step 1".to_string()),
            None,
        )]);
        let (tools, chat) = tool_client(backend, seeded_store(&dir).await);

        let result = tools
            .execute(
                "math_reasoning",
                r#"{"question": "how many?", "context": "two seasons"}"#,
            )
            .await;
        assert_eq!(result, "\"step 1\"");
        assert_eq!(chat.usage().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = tool_client(ScriptedBackend::default(), seeded_store(&dir).await);
        let result = tools.execute("web_search", "{}").await;
        assert_eq!(result, "Tool web_search not found in tool registry.");
    }

    #[tokio::test]
    async fn test_bad_arguments_are_reported() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = tool_client(ScriptedBackend::default(), seeded_store(&dir).await);
        let result = tools.execute("get_context", r#"{"limit": 3}"#).await;
        assert!(result.starts_with("Error executing tool get_context: "));
    }
}
