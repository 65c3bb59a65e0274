//! Tool-calling conversation agent.
//!
//! A turn loads the conversation, appends the user message and calls the chat
//! model until it answers without tool calls. Every tool call of a response is
//! executed and answered with one `tool` entry before the model is called
//! again. The number of model calls per turn is bounded.

use std::sync::Arc;
use std::time::Duration;

use super::conversation::{ConversationStore, EventSink};
use super::llm::{ChatRequest, RateLimitedClient};
use super::tools::{Tool, ToolClient};
use crate::error::AgentError;
use crate::models::{AgentConfig, ConversationEntry, InputMessage, OutputMessage, ToolCall};

pub const ROUTING_SYSTEM_PROMPT: &str = "You are an assistant that answers questions about a single document.
Use the get_context tool to look up passages of the document before answering; rewrite the user's question into a search query that also contains a plausible answer.
Use the math_reasoning tool when the answer requires calculations, passing the retrieved passages as context.
Answer in the language of the question. If the document does not contain the answer, say so.
";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub struct Agent {
    chat: Arc<RateLimitedClient>,
    tools: ToolClient,
    store: Arc<dyn ConversationStore>,
    system_prompt: String,
    max_iterations: usize,
    temperature: f32,
    notice_delay: Duration,
}

impl Agent {
    pub fn new(
        chat: Arc<RateLimitedClient>,
        tools: ToolClient,
        store: Arc<dyn ConversationStore>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            chat,
            tools,
            store,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| ROUTING_SYSTEM_PROMPT.to_string()),
            max_iterations: config.max_iterations.max(1),
            temperature: DEFAULT_TEMPERATURE,
            notice_delay: Duration::ZERO,
        }
    }

    /// Sampling temperature of the routing model.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Pause between announcing a tool call and running it.
    pub fn with_notice_delay(mut self, delay: Duration) -> Self {
        self.notice_delay = delay;
        self
    }

    pub fn collection(&self) -> &str {
        self.tools.collection()
    }

    /// Answer one user message.
    ///
    /// The conversation is stored back only when the turn completes.
    pub async fn handle(
        &self,
        input: &InputMessage,
        events: &dyn EventSink,
    ) -> Result<OutputMessage, AgentError> {
        let mut conversation = self.store.get(&input.conversation_id).await;
        if conversation.is_empty() {
            conversation.push(ConversationEntry::system(self.system_prompt.clone()));
        }

        events.post(format!("👤: {}", input.message)).await;
        conversation.push(ConversationEntry::user(input.message.clone()));

        let answer = self.run(&mut conversation, events).await?;
        events.post(format!("🤖: {}", answer)).await;

        tracing::info!(
            conversation_id = %input.conversation_id,
            correlation_id = %input.correlation_id,
            entries = conversation.len(),
            "turn completed"
        );
        self.store.put(&input.conversation_id, conversation).await;

        Ok(OutputMessage::reply_to(input, answer))
    }

    async fn run(
        &self,
        conversation: &mut Vec<ConversationEntry>,
        events: &dyn EventSink,
    ) -> Result<String, AgentError> {
        for iteration in 0..self.max_iterations {
            let request = ChatRequest::new(conversation.clone())
                .with_temperature(self.temperature)
                .with_tools(Tool::schemas());
            let response = self.chat.complete(&request).await?;
            let message = response.message.ok_or(AgentError::EmptyResponse)?;

            let entry = ConversationEntry::assistant(message.content, message.tool_calls);
            let calls = entry.tool_calls.clone().unwrap_or_default();
            conversation.push(entry);

            if calls.is_empty() {
                return Ok(conversation
                    .last()
                    .map(|e| e.content_str().to_string())
                    .unwrap_or_default());
            }

            tracing::debug!(iteration, calls = calls.len(), "model requested tools");
            for call in &calls {
                let result = self.call_tool(call, events).await;
                conversation.push(ConversationEntry::tool(call, result));
            }
        }

        Err(AgentError::MaxIterations(self.max_iterations))
    }

    async fn call_tool(&self, call: &ToolCall, events: &dyn EventSink) -> String {
        let name = &call.function.name;
        let arguments = &call.function.arguments;

        events.post(format!("    🛠️ \"{}\" {}", name, arguments)).await;
        if !self.notice_delay.is_zero() {
            tokio::time::sleep(self.notice_delay).await;
        }

        let result = self.tools.execute(name, arguments).await;
        events
            .post(format!("    🛠️ Tool ended with result: {}", result))
            .await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::conversation::{InMemoryConversationStore, NullSink};
    use crate::services::llm::testing::ScriptedBackend;
    use crate::services::tools::testing::{seeded_store, tool_client};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn answer(text: &str) -> ConversationEntry {
        ConversationEntry::assistant(Some(text.to_string()), None)
    }

    fn calls(calls: Vec<ToolCall>) -> ConversationEntry {
        ConversationEntry::assistant(None, Some(calls))
    }

    async fn agent(
        dir: &TempDir,
        replies: Vec<ConversationEntry>,
        config: AgentConfig,
    ) -> (Agent, Arc<RateLimitedClient>, Arc<InMemoryConversationStore>) {
        let (tools, chat) = tool_client(
            ScriptedBackend::with_replies(replies),
            seeded_store(dir).await,
        );
        let store = Arc::new(InMemoryConversationStore::new());
        let agent = Agent::new(chat.clone(), tools, store.clone(), &config);
        (agent, chat, store)
    }

    #[tokio::test]
    async fn test_answer_without_tools() {
        let dir = TempDir::new().unwrap();
        let (agent, _, store) = agent(&dir, vec![answer("Paris")], AgentConfig::default()).await;

        let input = InputMessage::new("c1", "u1", "Capital of France?");
        let output = agent.handle(&input, &NullSink).await.unwrap();

        assert_eq!(output.message, "Paris");
        assert_eq!(output.correlation_id, input.correlation_id);
        assert_eq!(output.conversation_id, "c1");

        let history = store.get("c1").await;
        let roles: Vec<Role> = history.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(history[0].content_str(), ROUTING_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_requests_use_configured_temperature() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::with_replies(vec![answer("ok")]);
        let requests = backend.requests.clone();
        let (tools, chat) = tool_client(backend, seeded_store(&dir).await);
        let agent = Agent::new(
            chat,
            tools,
            Arc::new(InMemoryConversationStore::new()),
            &AgentConfig::default(),
        )
        .with_temperature(0.2);

        agent
            .handle(&InputMessage::new("c1", "u1", "q"), &NullSink)
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(0.2));
        assert_eq!(
            requests[0].tools.as_ref().map(Vec::len),
            Some(Tool::ALL.len())
        );
    }

    #[tokio::test]
    async fn test_one_tool_call_then_answer() {
        let dir = TempDir::new().unwrap();
        let call = ToolCall::new("call_1", "get_context", r#"{"search_query": "q", "limit": 3}"#);
        let (agent, chat, store) = agent(
            &dir,
            vec![calls(vec![call]), answer("done")],
            AgentConfig::default(),
        )
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = agent
            .handle(&InputMessage::new("c1", "u1", "question"), &tx)
            .await
            .unwrap();
        assert_eq!(output.message, "done");
        // Two model calls at 15 tokens each.
        assert_eq!(chat.usage().total_tokens, 30);

        let history = store.get("c1").await;
        let roles: Vec<Role> = history.iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(history[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(history[3].name.as_deref(), Some("get_context"));

        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], "👤: question");
        assert!(events[1].starts_with("    🛠️ \"get_context\""));
        assert!(events[2].starts_with("    🛠️ Tool ended with result: "));
        assert_eq!(events[3], "🤖: done");
    }

    #[tokio::test]
    async fn test_all_calls_of_a_response_are_answered() {
        let dir = TempDir::new().unwrap();
        let first = ToolCall::new("a", "get_context", r#"{"search_query": "x"}"#);
        let second = ToolCall::new("b", "unknown_tool", "{}");
        let (agent, _, store) = agent(
            &dir,
            vec![calls(vec![first, second]), answer("ok")],
            AgentConfig::default(),
        )
        .await;

        agent
            .handle(&InputMessage::new("c1", "u1", "q"), &NullSink)
            .await
            .unwrap();

        let history = store.get("c1").await;
        let tool_entries: Vec<&ConversationEntry> =
            history.iter().filter(|e| e.role == Role::Tool).collect();
        assert_eq!(tool_entries.len(), 2);
        assert_eq!(
            tool_entries[1].content_str(),
            "Tool unknown_tool not found in tool registry."
        );
    }

    #[tokio::test]
    async fn test_iteration_bound() {
        let dir = TempDir::new().unwrap();
        let looping = |id: &str| calls(vec![ToolCall::new(id, "get_context", r#"{"search_query": "x"}"#)]);
        let config = AgentConfig {
            max_iterations: 2,
            ..Default::default()
        };
        let (agent, _, store) = agent(&dir, vec![looping("a"), looping("b"), answer("late")], config).await;

        let err = agent
            .handle(&InputMessage::new("c1", "u1", "q"), &NullSink)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(2)));
        assert!(store.get("c1").await.is_empty());
    }

    #[tokio::test]
    async fn test_history_carries_across_turns() {
        let dir = TempDir::new().unwrap();
        let (agent, _, store) = agent(
            &dir,
            vec![answer("first"), answer("second")],
            AgentConfig::default(),
        )
        .await;

        agent
            .handle(&InputMessage::new("c1", "u1", "one"), &NullSink)
            .await
            .unwrap();
        agent
            .handle(&InputMessage::new("c1", "u1", "two"), &NullSink)
            .await
            .unwrap();

        let history = store.get("c1").await;
        assert_eq!(history.len(), 5);
        assert_eq!(
            history.iter().filter(|e| e.role == Role::System).count(),
            1
        );
    }
}
