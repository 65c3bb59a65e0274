use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{chat_client, embedding_client, vector_store};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{
    ChunkStrategy, IngestPipeline, MarkdownChunker, OcrClient, PipelineOptions, PipelineStep,
};

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(help = "Document to upload for OCR")]
    pub file: Option<PathBuf>,

    #[arg(long, help = "OCR file id of an already uploaded document, used instead of uploading FILE")]
    pub file_id: Option<String>,

    #[arg(long, short = 'c', help = "Target collection (defaults to the file id)")]
    pub collection: Option<String>,

    #[arg(
        long,
        default_value = "upload",
        help = "First step: upload, ocr, chunk, create-collection, embed, load (or 1-6)"
    )]
    pub from_step: PipelineStep,

    #[arg(long, default_value = "load", help = "Last step to run")]
    pub to_step: PipelineStep,

    #[arg(long, short = 's', help = "Chunk strategy: headers, page-overlap, header-overlap, llm-merge")]
    pub strategy: Option<ChunkStrategy>,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let options = PipelineOptions {
        file: args.file,
        file_id: args.file_id,
        collection: args.collection,
        from: args.from_step,
        to: args.to_step,
    };
    let mut chunking = config.chunking.clone();
    if let Some(strategy) = args.strategy {
        chunking.strategy = strategy;
    }
    let chunker = MarkdownChunker::new(&chunking);

    if verbose {
        eprintln!("Steps: {} to {}", options.from, options.to);
        eprintln!("  Strategy:     {}", chunker.strategy());
        eprintln!("  Vector store: {}", config.vector_store.driver_name());
    }

    // Only build the clients the selected steps need.
    let mut pipeline = IngestPipeline::new(&config.pipeline.processed_dir, chunker.clone())
        .with_progress(format == OutputFormat::Text);
    if options.includes(PipelineStep::Upload) || options.includes(PipelineStep::Ocr) {
        let ocr = OcrClient::new(&config.ocr).context("failed to create OCR client")?;
        pipeline = pipeline.with_ocr(ocr);
    }
    if options.includes(PipelineStep::Chunk) && chunker.strategy().requires_model() {
        pipeline = pipeline.with_chat(chat_client(&config)?);
    }
    if options.includes(PipelineStep::Embed) {
        pipeline = pipeline.with_embeddings(
            embedding_client(&config)?,
            config.embedding.batch_size as usize,
        );
    }
    if options.includes(PipelineStep::CreateCollection) || options.includes(PipelineStep::Load) {
        pipeline = pipeline.with_store(vector_store(&config)?);
    }

    let report = pipeline.run(&options).await.context("ingestion failed")?;
    print!("{}", formatter.format_pipeline_report(&report));

    Ok(())
}
