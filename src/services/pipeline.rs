//! Resumable document ingestion: upload, OCR, chunk, create collection, embed, load.
//!
//! Each step persists an artifact under the processed directory, so a later run
//! can start from any step and pick up the artifacts of the earlier ones.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::chunker::MarkdownChunker;
use super::llm::RateLimitedClient;
use super::ocr::OcrClient;
use super::page_merge::PageMerger;
use super::vector_store::VectorStoreGateway;
use crate::error::{ChunkError, PipelineError};
use crate::models::{Chunk, ChunkWithEmbedding, OcrResponse, Point, filter_empty_chunks};
use crate::utils::file::{ArtifactPaths, read_json, write_json, write_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStep {
    Upload = 1,
    Ocr = 2,
    Chunk = 3,
    CreateCollection = 4,
    Embed = 5,
    Load = 6,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 6] = [
        PipelineStep::Upload,
        PipelineStep::Ocr,
        PipelineStep::Chunk,
        PipelineStep::CreateCollection,
        PipelineStep::Embed,
        PipelineStep::Load,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStep::Upload => write!(f, "upload"),
            PipelineStep::Ocr => write!(f, "ocr"),
            PipelineStep::Chunk => write!(f, "chunk"),
            PipelineStep::CreateCollection => write!(f, "create-collection"),
            PipelineStep::Embed => write!(f, "embed"),
            PipelineStep::Load => write!(f, "load"),
        }
    }
}

impl std::str::FromStr for PipelineStep {
    type Err = String;

    /// Accepts a step name or its 1-based number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        if let Ok(n) = normalized.parse::<u8>() {
            return Self::ALL
                .into_iter()
                .find(|step| step.number() == n)
                .ok_or_else(|| format!("step number must be 1-6, got {}", n));
        }
        Self::ALL
            .into_iter()
            .find(|step| step.to_string() == normalized)
            .ok_or_else(|| format!("unknown pipeline step: {}", s))
    }
}

/// What to ingest and which steps to run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Local document; required when the upload step runs.
    pub file: Option<PathBuf>,
    /// OCR file id; required when starting after the upload step.
    pub file_id: Option<String>,
    /// Defaults to the file id.
    pub collection: Option<String>,
    pub from: PipelineStep,
    pub to: PipelineStep,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            file: None,
            file_id: None,
            collection: None,
            from: PipelineStep::Upload,
            to: PipelineStep::Load,
        }
    }
}

impl PipelineOptions {
    pub fn includes(&self, step: PipelineStep) -> bool {
        self.from <= step && step <= self.to
    }
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub file_id: String,
    pub collection: String,
    pub steps: Vec<PipelineStep>,
    pub pages: Option<usize>,
    pub chunks: Option<usize>,
    pub embedded: Option<usize>,
    pub upserted: Option<u64>,
    pub artifacts: Vec<PathBuf>,
}

/// Intermediate results, loaded from artifacts when their step is skipped.
#[derive(Default)]
struct PipelineState {
    ocr: Option<OcrResponse>,
    chunks: Option<Vec<Chunk>>,
    embedded: Option<Vec<ChunkWithEmbedding>>,
}

pub struct IngestPipeline {
    processed_dir: PathBuf,
    chunker: MarkdownChunker,
    ocr: Option<OcrClient>,
    chat: Option<Arc<RateLimitedClient>>,
    embeddings: Option<Arc<RateLimitedClient>>,
    store: Option<Arc<VectorStoreGateway>>,
    batch_size: usize,
    show_progress: bool,
}

impl IngestPipeline {
    pub fn new(processed_dir: impl Into<PathBuf>, chunker: MarkdownChunker) -> Self {
        Self {
            processed_dir: processed_dir.into(),
            chunker,
            ocr: None,
            chat: None,
            embeddings: None,
            store: None,
            batch_size: 1,
            show_progress: false,
        }
    }

    pub fn with_ocr(mut self, ocr: OcrClient) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Chat model used by the `llm-merge` chunk strategy.
    pub fn with_chat(mut self, chat: Arc<RateLimitedClient>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_embeddings(mut self, embeddings: Arc<RateLimitedClient>, batch_size: usize) -> Self {
        self.embeddings = Some(embeddings);
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_store(mut self, store: Arc<VectorStoreGateway>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub async fn run(&self, options: &PipelineOptions) -> Result<PipelineReport, PipelineError> {
        if options.from > options.to {
            return Err(PipelineError::InvalidStepRange(format!(
                "{} comes after {}",
                options.from, options.to
            )));
        }

        let mut report = PipelineReport::default();
        let file_id = if options.includes(PipelineStep::Upload) {
            report.steps.push(PipelineStep::Upload);
            self.upload(options).await?
        } else {
            options.file_id.clone().ok_or_else(|| PipelineError::MissingInput {
                step: options.from.to_string(),
                message: "a file id is required when the upload step is skipped".to_string(),
            })?
        };

        let paths = ArtifactPaths::new(&self.processed_dir, &file_id);
        let collection = options.collection.clone().unwrap_or_else(|| file_id.clone());
        report.file_id = file_id.clone();
        report.collection = collection.clone();

        let mut state = PipelineState::default();

        if options.includes(PipelineStep::Ocr) {
            report.steps.push(PipelineStep::Ocr);
            let ocr = self.ocr_client(PipelineStep::Ocr)?;
            tracing::info!(step = %PipelineStep::Ocr, file_id = %file_id, "running OCR");
            let result = ocr.process_file(&file_id).await?;

            write_json(&paths.ocr_json(), &result)?;
            write_text(&paths.ocr_markdown(), &result.combined_markdown())?;
            report.artifacts.push(paths.ocr_json());
            report.artifacts.push(paths.ocr_markdown());
            report.pages = Some(result.pages.len());
            state.ocr = Some(result);
        }

        if options.includes(PipelineStep::Chunk) {
            report.steps.push(PipelineStep::Chunk);
            let ocr = match state.ocr.take() {
                Some(ocr) => ocr,
                None => load_artifact(PipelineStep::Chunk, &paths.ocr_json())?,
            };
            report.pages = Some(ocr.pages.len());

            let chunks = self.chunk(&ocr).await?;
            tracing::info!(
                step = %PipelineStep::Chunk,
                strategy = %self.chunker.strategy(),
                chunks = chunks.len(),
                "chunked document"
            );
            write_json(&paths.chunks(), &chunks)?;
            report.artifacts.push(paths.chunks());
            report.chunks = Some(chunks.len());
            state.chunks = Some(chunks);
        }

        if options.includes(PipelineStep::CreateCollection) {
            report.steps.push(PipelineStep::CreateCollection);
            let store = self.vector_store(PipelineStep::CreateCollection)?;
            let status = store.ensure_collection(&collection).await?;
            tracing::info!(step = %PipelineStep::CreateCollection, collection = %collection, ?status, "collection ready");
        }

        if options.includes(PipelineStep::Embed) {
            report.steps.push(PipelineStep::Embed);
            let chunks = match state.chunks.take() {
                Some(chunks) => chunks,
                None => load_artifact(PipelineStep::Embed, &paths.chunks())?,
            };

            let embedded = self.embed(chunks).await?;
            let path = paths.embeddings(Local::now().date_naive());
            write_json(&path, &embedded)?;
            tracing::info!(step = %PipelineStep::Embed, chunks = embedded.len(), path = %path.display(), "saved embeddings");
            report.artifacts.push(path);
            report.embedded = Some(embedded.len());
            state.embedded = Some(embedded);
        }

        if options.includes(PipelineStep::Load) {
            report.steps.push(PipelineStep::Load);
            let embedded = match state.embedded.take() {
                Some(embedded) => embedded,
                None => {
                    let path = paths.latest_embeddings()?.ok_or_else(|| {
                        PipelineError::MissingInput {
                            step: PipelineStep::Load.to_string(),
                            message: format!(
                                "no embeddings artifact for {} in {}",
                                file_id,
                                paths.dir().display()
                            ),
                        }
                    })?;
                    load_artifact(PipelineStep::Load, &path)?
                }
            };

            let upserted = self.load(&collection, embedded).await?;
            report.upserted = Some(upserted);
        }

        Ok(report)
    }

    /// Upload the document, or confirm that an already uploaded file id exists.
    async fn upload(&self, options: &PipelineOptions) -> Result<String, PipelineError> {
        let ocr = self.ocr_client(PipelineStep::Upload)?;

        match (&options.file, &options.file_id) {
            (Some(file), _) => {
                tracing::info!(step = %PipelineStep::Upload, file = %file.display(), "uploading document");
                let uploaded = ocr.upload(file).await?;
                Ok(uploaded.id)
            }
            (None, Some(file_id)) => {
                let existing = ocr.retrieve(file_id).await?;
                tracing::info!(
                    step = %PipelineStep::Upload,
                    file_id = %existing.id,
                    filename = %existing.filename,
                    "using uploaded document"
                );
                Ok(existing.id)
            }
            (None, None) => Err(PipelineError::MissingInput {
                step: PipelineStep::Upload.to_string(),
                message: "a document path or an uploaded file id is required".to_string(),
            }),
        }
    }

    async fn chunk(&self, ocr: &OcrResponse) -> Result<Vec<Chunk>, PipelineError> {
        let pages = ocr.page_markdowns();
        if pages.is_empty() {
            return Err(ChunkError::NoPages.into());
        }

        if self.chunker.strategy().requires_model() {
            let chat = self.chat.as_deref().ok_or_else(|| PipelineError::MissingComponent {
                step: PipelineStep::Chunk.to_string(),
                component: "a chat model",
            })?;
            return Ok(PageMerger::new(chat).merge(&pages).await?);
        }

        Ok(self.chunker.chunk(&pages)?)
    }

    async fn embed(&self, chunks: Vec<Chunk>) -> Result<Vec<ChunkWithEmbedding>, PipelineError> {
        let embeddings = self
            .embeddings
            .as_deref()
            .ok_or_else(|| PipelineError::MissingComponent {
                step: PipelineStep::Embed.to_string(),
                component: "an embedding model",
            })?;

        let chunks = filter_empty_chunks(chunks);
        let progress = self.progress_bar(chunks.len() as u64);
        let mut embedded = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            for chunk in batch {
                tracing::debug!(chunk_id = chunk.id, chars = chunk.char_len(), "embedding chunk");
            }

            let response = embeddings.embed(&texts).await?;
            let mut vectors = response.embeddings.into_iter();
            for chunk in batch {
                embedded.push(ChunkWithEmbedding::new(chunk.clone(), vectors.next()));
                progress.inc(1);
            }
        }

        progress.finish_and_clear();
        Ok(embedded)
    }

    async fn load(
        &self,
        collection: &str,
        embedded: Vec<ChunkWithEmbedding>,
    ) -> Result<u64, PipelineError> {
        let store = self.vector_store(PipelineStep::Load)?;
        load_embeddings(store, collection, embedded).await
    }

    fn ocr_client(&self, step: PipelineStep) -> Result<&OcrClient, PipelineError> {
        self.ocr.as_ref().ok_or_else(|| PipelineError::MissingComponent {
            step: step.to_string(),
            component: "an OCR client",
        })
    }

    fn vector_store(&self, step: PipelineStep) -> Result<&VectorStoreGateway, PipelineError> {
        self.store.as_deref().ok_or_else(|| PipelineError::MissingComponent {
            step: step.to_string(),
            component: "a vector store",
        })
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

/// Upsert every chunk that has an embedding; chunks without one are skipped.
pub async fn load_embeddings(
    store: &VectorStoreGateway,
    collection: &str,
    embedded: Vec<ChunkWithEmbedding>,
) -> Result<u64, PipelineError> {
    let points: Vec<Point> = embedded
        .into_iter()
        .filter_map(|chunk| {
            let id = chunk.id;
            match Point::try_from(chunk) {
                Ok(point) => Some(point),
                Err(e) => {
                    tracing::warn!(chunk_id = id, error = %e, "skipping chunk");
                    None
                }
            }
        })
        .collect();

    if points.is_empty() {
        return Err(PipelineError::NoEmbeddings);
    }

    let ack = store.upsert(collection, points).await?;
    tracing::info!(step = %PipelineStep::Load, collection, upserted = ack.upserted, "loaded embeddings");
    Ok(ack.upserted)
}

fn load_artifact<T: serde::de::DeserializeOwned>(
    step: PipelineStep,
    path: &std::path::Path,
) -> Result<T, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            step: step.to_string(),
            message: format!("{} not found", path.display()),
        });
    }
    tracing::debug!(%step, path = %path.display(), "loading artifact");
    Ok(read_json(path)?)
}
