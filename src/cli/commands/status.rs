use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::VectorStoreGateway;

pub async fn handle_status(format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let vector_store_location = match &config.vector_store.url {
        Some(url) => url.clone(),
        None => config.vector_store.local_path.display().to_string(),
    };

    let (vector_store_connected, collection) = match VectorStoreGateway::from_config(&config) {
        Ok(store) => {
            let connected = store.health_check().await.unwrap_or(false);
            let collection = match (&config.retrieval.collection, connected) {
                (Some(name), true) => store.collection_info(name).await.ok().flatten(),
                _ => None,
            };
            (connected, collection)
        }
        Err(e) => {
            if verbose {
                eprintln!("Vector store unavailable: {e}");
            }
            (false, None)
        }
    };

    let status = StatusInfo {
        chat_provider: config.llm.provider.to_string(),
        chat_model: config.llm.chat_model.clone(),
        chat_key_set: config.llm.api_key.is_some(),
        embedding_provider: config.embedding.provider.to_string(),
        embedding_model: config.embedding.model.clone(),
        embedding_key_set: config.embedding.api_key.is_some(),
        ocr_key_set: config.ocr.api_key.is_some(),
        vector_store_driver: config.vector_store.driver_name().to_string(),
        vector_store_location,
        vector_store_connected,
        collection,
    };

    print!("{}", formatter.format_status(&status));

    if !vector_store_connected && config.vector_store.url.is_some() {
        eprintln!();
        eprintln!("Warning: Qdrant not reachable. Start with: docker run -p 6334:6334 qdrant/qdrant");
    }
    if let Some(name) = &config.retrieval.collection
        && vector_store_connected
        && status.collection.is_none()
    {
        eprintln!("Hint: collection '{name}' does not exist yet. Run: docrag ingest <file> -c {name}");
    }

    Ok(())
}
