//! Command line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// OCR documents into a vector store and chat with them through a tool-calling agent.
#[derive(Debug, Parser)]
#[command(name = "docrag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the ingestion pipeline (upload, OCR, chunk, collection, embed, load)
    Ingest(commands::IngestArgs),

    /// Chunk a saved OCR result
    Chunk(commands::ChunkArgs),

    /// Manage vector store collections
    #[command(subcommand)]
    Collection(commands::CollectionCommand),

    /// Load a saved embeddings file into a collection
    Load(commands::LoadArgs),

    /// Semantic search over a collection
    Search(commands::SearchArgs),

    /// Answer questions with the agent and save the answers
    Ask(commands::AskArgs),

    /// Serve chat conversations over TCP, one per connection
    Serve(commands::ServeArgs),

    /// Show providers, credentials and vector store status
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
