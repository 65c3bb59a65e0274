use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use super::{embedding_client, resolve_collection, vector_store};
use crate::cli::output::{SearchResults, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'c', help = "Collection to search (defaults to retrieval.collection)")]
    pub collection: Option<String>,

    #[arg(long, short = 'n', help = "Maximum number of results, clamped to the retrieval bounds")]
    pub limit: Option<u64>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let collection = resolve_collection(args.collection, &config)?;
    let start_time = Instant::now();

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Collection: {collection}");
        eprintln!(
            "  Limit: {}",
            config.retrieval.clamp_limit(args.limit)
        );
    }

    let embeddings = embedding_client(&config)?;
    let store = vector_store(&config)?;

    let vector = embeddings
        .embed_one(query)
        .await
        .context("failed to embed query")?;
    let results = store
        .query(&collection, vector, args.limit, true)
        .await
        .with_context(|| format!("search in '{}' failed", collection))?;

    let results = SearchResults {
        query: query.to_string(),
        collection,
        results,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_search_results(&results));

    Ok(())
}
