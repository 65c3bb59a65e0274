//! Conversation history entries and chat message envelopes.
//!
//! `ConversationEntry` serializes to the OpenAI-compatible chat message shape,
//! so a conversation can be sent to the model as-is.

use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function name and JSON-encoded arguments of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(deserialize_with = "arguments_as_string")]
    pub arguments: String,
}

/// Some providers send arguments as an object instead of a JSON string.
fn arguments_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok("{}".to_string()),
        other => Ok(other.to_string()),
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConversationEntry {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: tool_calls.filter(|calls| !calls.is_empty()),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call.id.clone()),
            name: Some(call.function.name.clone()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn now_iso() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// A user message entering the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(default = "new_correlation_id")]
    pub correlation_id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(default = "now_iso")]
    pub timestamp: String,
}

impl InputMessage {
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: new_correlation_id(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            message: message.into(),
            timestamp: now_iso(),
        }
    }
}

/// The agent's answer to an `InputMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub correlation_id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub message: String,
    pub timestamp: String,
}

impl OutputMessage {
    /// Build a reply that keeps the correlation and conversation ids of `input`.
    pub fn reply_to(input: &InputMessage, message: impl Into<String>) -> Self {
        Self {
            correlation_id: input.correlation_id.clone(),
            conversation_id: input.conversation_id.clone(),
            user_id: input.user_id.clone(),
            message: message.into(),
            timestamp: now_iso(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_wire_shape() {
        let call = ToolCall::new("call_1", "get_context", r#"{"search_query":"x"}"#);
        let assistant = ConversationEntry::assistant(None, Some(vec![call.clone()]));
        let value = serde_json::to_value(&assistant).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], Value::Null);
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(value["tool_calls"][0]["function"]["name"], "get_context");

        let tool = serde_json::to_value(ConversationEntry::tool(&call, "[]")).unwrap();
        assert_eq!(
            tool,
            json!({"role": "tool", "content": "[]", "tool_call_id": "call_1", "name": "get_context"})
        );
    }

    #[test]
    fn test_object_arguments_are_stringified() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": "c",
            "function": {"name": "math_reasoning", "arguments": {"question": "q"}}
        }))
        .unwrap();
        assert_eq!(call.function.arguments, r#"{"question":"q"}"#);
        assert_eq!(call.call_type, "function");
    }

    #[test]
    fn test_empty_tool_calls_dropped() {
        let entry = ConversationEntry::assistant(Some("hi".to_string()), Some(vec![]));
        assert!(!entry.has_tool_calls());
        assert!(entry.tool_calls.is_none());
    }

    #[test]
    fn test_output_copies_fixed_fields() {
        let input = InputMessage::new("conv", "user_123", "hello");
        let output = OutputMessage::reply_to(&input, "world");
        assert_eq!(output.correlation_id, input.correlation_id);
        assert_eq!(output.conversation_id, "conv");
        assert_eq!(output.message, "world");
    }

    #[test]
    fn test_input_defaults_on_deserialize() {
        let input: InputMessage = serde_json::from_value(json!({
            "conversation_id": "a", "user_id": "u", "message": "m"
        }))
        .unwrap();
        assert_eq!(input.correlation_id.len(), 32);
        assert!(!input.timestamp.is_empty());
    }
}
