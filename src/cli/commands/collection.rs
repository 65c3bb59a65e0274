use anyhow::{Context, Result};
use clap::Subcommand;

use super::vector_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, DistanceMetric, OutputFormat};
use crate::services::CollectionStatus;

#[derive(Debug, Subcommand)]
pub enum CollectionCommand {
    #[command(about = "Create a collection sized for the configured embedding model")]
    Create {
        name: String,
        #[arg(long, help = "Distance metric: cosine, dot, euclid (defaults to vector_store.distance)")]
        distance: Option<DistanceMetric>,
    },
    #[command(about = "Show point count, dimension and distance of a collection")]
    Info { name: String },
    #[command(about = "Delete a collection and all of its points")]
    Delete {
        name: String,
        #[arg(long, short = 'y', help = "Confirm the deletion")]
        yes: bool,
    },
}

pub async fn handle_collection(
    cmd: CollectionCommand,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let store = vector_store(&config)?;

    if verbose {
        eprintln!("Vector store: {}", store.driver());
    }

    match cmd {
        CollectionCommand::Create { name, distance } => {
            let distance = distance.unwrap_or(store.distance());
            let status = store
                .create_collection(&name, store.dimension(), distance)
                .await
                .with_context(|| format!("failed to create collection '{}'", name))?;
            let message = match status {
                CollectionStatus::Created => format!(
                    "Created collection '{}' ({} dimensions, {})",
                    name,
                    store.dimension(),
                    distance
                ),
                CollectionStatus::AlreadyExists => {
                    format!("Collection '{}' already exists", name)
                }
            };
            print!("{}", formatter.format_message(&message));
        }
        CollectionCommand::Info { name } => {
            let info = store
                .collection_info(&name)
                .await?
                .ok_or_else(|| anyhow::anyhow!("collection '{}' does not exist", name))?;
            print!("{}", formatter.format_collection(&info));
        }
        CollectionCommand::Delete { name, yes } => {
            if !yes {
                anyhow::bail!(
                    "refusing to delete collection '{}' without --yes",
                    name
                );
            }
            let message = if store.delete_collection(&name).await? {
                format!("Deleted collection '{}'", name)
            } else {
                format!("Collection '{}' does not exist", name)
            };
            print!("{}", formatter.format_message(&message));
        }
    }

    Ok(())
}
