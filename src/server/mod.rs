//! Line-oriented chat server.
//!
//! Every TCP connection is one conversation. Each received line is a user
//! message; progress notices and the final answer are written back one per
//! line.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::InputMessage;
use crate::services::Agent;

const USER_ID: &str = "cli_user";

pub struct ChatServer {
    listener: TcpListener,
    agent: Arc<Agent>,
}

impl ChatServer {
    pub async fn bind(addr: &str, agent: Arc<Agent>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, agent })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
        info!(
            addr = %self.local_addr()?,
            collection = self.agent.collection(),
            "chat server listening"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let agent = self.agent.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(agent, stream, peer).await {
                                    warn!(%peer, error = %e, "connection closed with error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("chat server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    agent: Arc<Agent>,
    stream: TcpStream,
    peer: SocketAddr,
) -> std::io::Result<()> {
    let conversation_id = uuid::Uuid::new_v4().to_string();
    info!(%peer, conversation_id = %conversation_id, "connection opened");

    let (reader, writer) = stream.into_split();
    serve_conversation(agent, &conversation_id, BufReader::new(reader), writer).await?;

    info!(%peer, conversation_id = %conversation_id, "connection closed");
    Ok(())
}

/// Run one conversation over a line reader and writer.
pub async fn serve_conversation<R, W>(
    agent: Arc<Agent>,
    conversation_id: &str,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        debug!(conversation_id, "message received");

        let input = InputMessage::new(conversation_id, USER_ID, message);
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let turn = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.handle(&input, &tx).await })
        };

        // The channel closes once the turn finishes and drops its sender.
        while let Some(event) = rx.recv().await {
            writer.write_all(event.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }

        let failure = match turn.await {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = failure {
            error!(conversation_id, error = %reason, "turn failed");
            writer
                .write_all(format!("⚠️ {}\n", reason).as_bytes())
                .await?;
        }
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentConfig, ConversationEntry};
    use crate::services::InMemoryConversationStore;
    use crate::services::llm::testing::ScriptedBackend;
    use crate::services::tools::testing::{seeded_store, tool_client};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn agent(dir: &TempDir, replies: Vec<ConversationEntry>) -> Arc<Agent> {
        let (tools, chat) = tool_client(
            ScriptedBackend::with_replies(replies),
            seeded_store(dir).await,
        );
        Arc::new(Agent::new(
            chat,
            tools,
            Arc::new(InMemoryConversationStore::new()),
            &AgentConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_each_line_is_a_turn() {
        let dir = TempDir::new().unwrap();
        let agent = agent(
            &dir,
            vec![
                ConversationEntry::assistant(Some("hello".to_string()), None),
                ConversationEntry::assistant(Some("again".to_string()), None),
            ],
        )
        .await;

        let input: &[u8] = b"hi\n\nsecond\n";
        let (client, mut server_side) = tokio::io::duplex(4096);
        serve_conversation(agent, "conv", input, client).await.unwrap();

        let mut output = String::new();
        server_side.read_to_string(&mut output).await.unwrap();
        assert_eq!(output, "👤: hi\n🤖: hello\n👤: second\n🤖: again\n");
    }

    #[tokio::test]
    async fn test_failed_turn_is_reported() {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir, vec![]).await;

        let input: &[u8] = b"hi\n";
        let (client, mut server_side) = tokio::io::duplex(4096);
        serve_conversation(agent, "conv", input, client).await.unwrap();

        let mut output = String::new();
        server_side.read_to_string(&mut output).await.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "👤: hi");
        assert!(lines[1].starts_with("⚠️ "));
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let server = ChatServer::bind("127.0.0.1:0", agent(&dir, vec![]).await)
            .await
            .unwrap();
        server.run(async {}).await.unwrap();
    }
}
