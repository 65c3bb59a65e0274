//! Conversation history storage and progress notices.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::ConversationEntry;

/// Keyed storage of conversation histories.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// History of a conversation; empty when unknown.
    async fn get(&self, conversation_id: &str) -> Vec<ConversationEntry>;

    async fn put(&self, conversation_id: &str, entries: Vec<ConversationEntry>);
}

/// Process-local store; histories are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<ConversationEntry>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, conversation_id: &str) -> Vec<ConversationEntry> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn put(&self, conversation_id: &str, entries: Vec<ConversationEntry>) {
        self.conversations
            .write()
            .await
            .insert(conversation_id.to_string(), entries);
    }
}

/// Receiver of human-readable progress notices.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn post(&self, event: String);
}

/// Drops notices after logging them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn post(&self, event: String) {
        tracing::debug!(event = %event, "no event sink attached");
    }
}

#[async_trait]
impl EventSink for UnboundedSender<String> {
    async fn post(&self, event: String) {
        if self.send(event).is_err() {
            tracing::debug!("event receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_store_round_trip() {
        let store = InMemoryConversationStore::new();
        assert!(store.get("a").await.is_empty());

        store
            .put("a", vec![ConversationEntry::user("hello")])
            .await;
        assert_eq!(store.get("a").await, vec![ConversationEntry::user("hello")]);
        assert!(store.get("b").await.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.post("one".to_string()).await;
        drop(tx);
        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(rx);
        tx.post("lost".to_string()).await;
    }
}
