use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use super::{build_agent, notice_delay, resolve_collection};
use crate::models::{Config, OutputFormat};
use crate::server::ChatServer;

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, short = 'a', help = "Listen address (defaults to server.addr)")]
    pub addr: Option<String>,

    #[arg(long, short = 'c', help = "Collection to answer from (defaults to retrieval.collection)")]
    pub collection: Option<String>,
}

pub async fn handle_serve(args: ServeArgs, _format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let collection = resolve_collection(args.collection, &config)?;
    let addr = args.addr.unwrap_or_else(|| config.server.addr.clone());

    let agent = build_agent(&config, &collection)?.with_notice_delay(notice_delay(&config));
    let server = ChatServer::bind(&addr, Arc::new(agent))
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    eprintln!(
        "Chat server listening on {} (collection '{}')",
        server.local_addr()?,
        collection
    );
    if verbose {
        eprintln!("  Chat model: {} ({})", config.llm.chat_model, config.llm.provider);
        eprintln!("  Max iterations: {}", config.agent.max_iterations);
    }

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
