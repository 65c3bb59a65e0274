use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::vector_store;
use crate::cli::output::get_formatter;
use crate::models::{ChunkWithEmbedding, Config, OutputFormat};
use crate::services::load_embeddings;
use crate::utils::file::read_json;

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[arg(help = "Embeddings JSON produced by the embed step")]
    pub embeddings_file: PathBuf,

    #[arg(long, short = 'c', required = true, help = "Target collection")]
    pub collection: String,
}

pub async fn handle_load(args: LoadArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let embedded: Vec<ChunkWithEmbedding> = read_json(&args.embeddings_file).with_context(|| {
        format!(
            "failed to read embeddings {}",
            args.embeddings_file.display()
        )
    })?;

    let store = vector_store(&config)?;
    if verbose {
        eprintln!(
            "Loading {} chunks into '{}' ({})",
            embedded.len(),
            args.collection,
            store.driver()
        );
    }

    store
        .ensure_collection(&args.collection)
        .await
        .with_context(|| format!("failed to prepare collection '{}'", args.collection))?;
    let upserted = load_embeddings(&store, &args.collection, embedded).await?;

    print!(
        "{}",
        formatter.format_message(&format!(
            "Loaded {} points into '{}'",
            upserted, args.collection
        ))
    );
    Ok(())
}
