use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::chat_client;
use crate::cli::output::get_formatter;
use crate::models::{Config, OcrResponse, OutputFormat};
use crate::services::{ChunkStrategy, MarkdownChunker, PageMerger};
use crate::utils::file::{read_json, write_json};

#[derive(Debug, Args)]
pub struct ChunkArgs {
    #[arg(help = "OCR result JSON produced by the ocr step")]
    pub ocr_file: PathBuf,

    #[arg(long, short = 's', help = "Chunk strategy: headers, page-overlap, header-overlap, llm-merge")]
    pub strategy: Option<ChunkStrategy>,

    #[arg(long, short = 'o', help = "Write the chunks to this JSON file instead of printing them")]
    pub output: Option<PathBuf>,
}

pub async fn handle_chunk(args: ChunkArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let ocr: OcrResponse = read_json(&args.ocr_file)
        .with_context(|| format!("failed to read OCR result {}", args.ocr_file.display()))?;
    let pages = ocr.page_markdowns();

    let mut chunking = config.chunking.clone();
    if let Some(strategy) = args.strategy {
        chunking.strategy = strategy;
    }
    let chunker = MarkdownChunker::new(&chunking);

    if verbose {
        eprintln!("Chunking {} pages", pages.len());
        eprintln!("  Strategy: {}", chunker.strategy());
    }

    let chunks = if chunker.strategy().requires_model() {
        let chat = chat_client(&config)?;
        PageMerger::new(&chat).merge(&pages).await?
    } else {
        chunker.chunk(&pages)?
    };

    match args.output {
        Some(path) => {
            write_json(&path, &chunks)
                .with_context(|| format!("failed to write {}", path.display()))?;
            print!(
                "{}",
                formatter.format_message(&format!(
                    "Wrote {} chunks to {}",
                    chunks.len(),
                    path.display()
                ))
            );
        }
        None => print!("{}", formatter.format_chunks(&chunks)),
    }

    Ok(())
}
