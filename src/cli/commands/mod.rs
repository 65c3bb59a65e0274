mod ask;
mod chunk;
mod collection;
mod config;
mod ingest;
mod load;
mod search;
mod serve;
mod status;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::Config;
use crate::services::{
    Agent, InMemoryConversationStore, RateLimitedClient, ToolClient, VectorStoreGateway,
};

pub use ask::AskArgs;
pub use chunk::ChunkArgs;
pub use collection::CollectionCommand;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use load::LoadArgs;
pub use search::SearchArgs;
pub use serve::ServeArgs;

pub use ask::handle_ask;
pub use chunk::handle_chunk;
pub use collection::handle_collection;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use load::handle_load;
pub use search::handle_search;
pub use serve::handle_serve;
pub use status::handle_status;

fn chat_client(config: &Config) -> Result<Arc<RateLimitedClient>> {
    let client = RateLimitedClient::chat_from_config(&config.llm)
        .with_context(|| format!("failed to create {} chat client", config.llm.provider))?;
    Ok(Arc::new(client))
}

fn embedding_client(config: &Config) -> Result<Arc<RateLimitedClient>> {
    let client = RateLimitedClient::embedding_from_config(&config.embedding).with_context(|| {
        format!(
            "failed to create {} embedding client",
            config.embedding.provider
        )
    })?;
    Ok(Arc::new(client))
}

fn vector_store(config: &Config) -> Result<Arc<VectorStoreGateway>> {
    let store = VectorStoreGateway::from_config(config).with_context(|| {
        format!(
            "failed to open {} vector store",
            config.vector_store.driver_name()
        )
    })?;
    Ok(Arc::new(store))
}

/// Collection from the command line, else from `retrieval.collection`.
fn resolve_collection(arg: Option<String>, config: &Config) -> Result<String> {
    arg.or_else(|| config.retrieval.collection.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("no collection given: pass --collection or set retrieval.collection")
        })
}

/// Agent answering questions about `collection` with a fresh conversation store.
fn build_agent(config: &Config, collection: &str) -> Result<Agent> {
    let chat = chat_client(config)?;
    let tools = ToolClient::new(
        chat.clone(),
        embedding_client(config)?,
        vector_store(config)?,
        collection,
    );
    Ok(Agent::new(
        chat,
        tools,
        Arc::new(InMemoryConversationStore::new()),
        &config.agent,
    )
    .with_temperature(config.llm.temperature))
}

fn notice_delay(config: &Config) -> Duration {
    Duration::from_millis(config.server.notice_delay_ms)
}
