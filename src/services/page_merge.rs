//! Page merging driven by a chat model's continuity verdict.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::llm::{ChatRequest, RateLimitedClient, ResponseSchema};
use crate::error::{ChunkError, LlmError};
use crate::models::{Chunk, ConversationEntry};

const MERGE_SYSTEM_PROMPT: &str = "Compare the text extracted from the following two pages and determine if they should be merged into one chunk.
You want to merge the two pages if and only if what you see at the top of the second page is a continuation of what you see at the end of the first page, for example:
1. A table that is split into two pages
2. A continuing list
3. A sentence in a paragraph which starts in the first page and continues in the second page

Pages with similar topics but not continuing text should be kept separate.
Pages are separated by triple tilde.
";

/// The model's structured answer for one pair of pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingEvaluation {
    pub internal_reasoning: String,
    pub is_continuing: bool,
}

impl ChunkingEvaluation {
    pub fn schema() -> ResponseSchema {
        ResponseSchema::new(
            "chunking_evaluation",
            json!({
                "type": "object",
                "properties": {
                    "internal_reasoning": {
                        "type": "string",
                        "description": "Reason for continuing text across chunks or not."
                    },
                    "is_continuing": {
                        "type": "boolean",
                        "description": "True if the text in the second page continues what is in the first page."
                    }
                },
                "required": ["internal_reasoning", "is_continuing"],
                "additionalProperties": false
            }),
        )
    }
}

/// Merges consecutive pages into one chunk while the model says they continue.
pub struct PageMerger<'a> {
    client: &'a RateLimitedClient,
}

impl<'a> PageMerger<'a> {
    pub fn new(client: &'a RateLimitedClient) -> Self {
        Self { client }
    }

    pub async fn merge<S: AsRef<str>>(&self, pages: &[S]) -> Result<Vec<Chunk>, ChunkError> {
        let schema = ChunkingEvaluation::schema();
        let mut chunks: Vec<Chunk> = Vec::new();

        for (index, page) in pages.iter().enumerate() {
            let page = page.as_ref();
            let Some(last) = chunks.last_mut() else {
                chunks.push(Chunk::new(0, page));
                continue;
            };

            let evaluation = self.evaluate(&last.text, page, &schema).await?;
            tracing::debug!(
                page = index,
                is_continuing = evaluation.is_continuing,
                reasoning = %evaluation.internal_reasoning,
                "page continuity evaluated"
            );

            if evaluation.is_continuing {
                last.text.push('\n');
                last.text.push_str(page);
            } else {
                let id = chunks.len() as u64;
                chunks.push(Chunk::new(id, page));
            }
        }

        Ok(chunks)
    }

    async fn evaluate(
        &self,
        previous: &str,
        page: &str,
        schema: &ResponseSchema,
    ) -> Result<ChunkingEvaluation, ChunkError> {
        let request = ChatRequest::new(vec![
            ConversationEntry::system(MERGE_SYSTEM_PROMPT),
            ConversationEntry::user(format!(
                "\nFirst page:\n~~~~\n{}\n~~~~\n\n\n\nSecond page:\n~~~~\n{}\n~~~~\n",
                previous, page
            )),
        ])
        .with_temperature(0.0);

        self.client
            .parse(&request, schema)
            .await
            .map_err(|e| match e {
                LlmError::InvalidResponse { message, .. } => ChunkError::InvalidEvaluation(message),
                other => ChunkError::MergeCheck(other),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::testing::{ScriptedBackend, client};

    fn verdict(is_continuing: bool) -> ConversationEntry {
        ConversationEntry::assistant(
            Some(
                json!({"internal_reasoning": "checked", "is_continuing": is_continuing})
                    .to_string(),
            ),
            None,
        )
    }

    #[tokio::test]
    async fn test_merges_continuing_pages() {
        let backend = ScriptedBackend::with_replies(vec![verdict(true), verdict(false)]);
        let client = client(backend);
        let chunks = PageMerger::new(&client)
            .merge(&["| a |", "| b |", "# New"])
            .await
            .unwrap();

        assert_eq!(
            chunks,
            vec![Chunk::new(0, "| a |\n| b |"), Chunk::new(1, "# New")]
        );
    }

    #[tokio::test]
    async fn test_single_page_needs_no_call() {
        let client = client(ScriptedBackend::default());
        let chunks = PageMerger::new(&client).merge(&["only"]).await.unwrap();
        assert_eq!(chunks, vec![Chunk::new(0, "only")]);
        assert_eq!(client.usage().total_tokens, 0);
    }

    #[tokio::test]
    async fn test_malformed_verdict() {
        let backend = ScriptedBackend::with_replies(vec![ConversationEntry::assistant(
            Some("yes".to_string()),
            None,
        )]);
        let client = client(backend);
        let err = PageMerger::new(&client)
            .merge(&["a", "b"])
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkError::InvalidEvaluation(_)));
    }
}
