//! Markdown chunking of OCR pages.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ChunkError;
use crate::models::{Chunk, ChunkingConfig};

/// Marker placed between a page and the context borrowed from its neighbours.
pub const PAGE_BREAK: &str = "<br>PAGE_BREAK<br>";

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("valid header regex"));

static HEADER_MULTILINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+.*$").expect("valid header regex"));

/// How pages are turned into chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkStrategy {
    /// One chunk per header section, prefixed with its ancestor headers.
    Headers,
    /// One chunk per page with character overlap from the neighbouring pages.
    #[default]
    PageOverlap,
    /// One chunk per page with the neighbouring header sections attached.
    HeaderOverlap,
    /// Merge consecutive pages when the chat model judges them continuous.
    LlmMerge,
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkStrategy::Headers => write!(f, "headers"),
            ChunkStrategy::PageOverlap => write!(f, "page-overlap"),
            ChunkStrategy::HeaderOverlap => write!(f, "header-overlap"),
            ChunkStrategy::LlmMerge => write!(f, "llm-merge"),
        }
    }
}

impl std::str::FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "headers" => Ok(ChunkStrategy::Headers),
            "page-overlap" | "overlap" => Ok(ChunkStrategy::PageOverlap),
            "header-overlap" => Ok(ChunkStrategy::HeaderOverlap),
            "llm-merge" | "llm" => Ok(ChunkStrategy::LlmMerge),
            _ => Err(format!("unknown chunk strategy: {}", s)),
        }
    }
}

impl ChunkStrategy {
    /// Strategies that need a chat model are run by `PageMerger`.
    pub fn requires_model(&self) -> bool {
        matches!(self, ChunkStrategy::LlmMerge)
    }
}

/// A header section: ancestor header lines and the section's own lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Section {
    pub prefix: Vec<String>,
    pub body: Vec<String>,
}

impl Section {
    fn text(&self) -> String {
        self.prefix
            .iter()
            .chain(self.body.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Chunker for the strategies that need no model call.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    strategy: ChunkStrategy,
    overlap_chars: usize,
    max_chunk_chars: usize,
}

impl MarkdownChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            strategy: config.strategy,
            overlap_chars: config.overlap_chars,
            max_chunk_chars: config.max_chunk_chars,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&ChunkingConfig::default())
    }

    pub fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    /// Chunk page markdowns in document order. Ids are dense from 0.
    pub fn chunk<S: AsRef<str>>(&self, pages: &[S]) -> Result<Vec<Chunk>, ChunkError> {
        let texts = match self.strategy {
            ChunkStrategy::Headers => split_by_headers(pages)
                .iter()
                .map(Section::text)
                .collect(),
            ChunkStrategy::PageOverlap => self.page_overlap(pages),
            ChunkStrategy::HeaderOverlap => self.header_overlap(pages),
            ChunkStrategy::LlmMerge => return Err(ChunkError::ModelRequired(self.strategy)),
        };

        let chunks: Vec<Chunk> = texts
            .into_iter()
            .enumerate()
            .map(|(id, text)| Chunk::new(id as u64, text))
            .collect();

        tracing::debug!(
            strategy = %self.strategy,
            pages = pages.len(),
            chunks = chunks.len(),
            "chunked document"
        );
        Ok(chunks)
    }

    fn page_overlap<S: AsRef<str>>(&self, pages: &[S]) -> Vec<String> {
        let mut texts = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            let mut text = String::new();
            if i > 0 {
                text.push_str("\n\n...");
                text.push_str(tail_chars(pages[i - 1].as_ref(), self.overlap_chars));
                text.push_str(PAGE_BREAK);
            }
            text.push_str(page.as_ref());
            if let Some(next) = pages.get(i + 1) {
                text.push_str("\n\n");
                text.push_str(PAGE_BREAK);
                text.push_str("\n\n");
                text.push_str(head_chars(next.as_ref(), self.overlap_chars));
                text.push_str("...\n\n");
            }
            self.push_bisected(&mut texts, text);
        }
        texts
    }

    fn header_overlap<S: AsRef<str>>(&self, pages: &[S]) -> Vec<String> {
        let mut texts = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            let mut text = String::new();
            if i > 0
                && let Some(section) = from_last_header(pages[i - 1].as_ref())
            {
                text.push_str(section);
                text.push_str("\n\n");
                text.push_str(PAGE_BREAK);
                text.push_str("\n\n");
            }
            text.push_str(page.as_ref());
            if let Some(next) = pages.get(i + 1)
                && let Some(lead) = before_first_header(next.as_ref())
            {
                text.push_str("\n\n");
                text.push_str(PAGE_BREAK);
                text.push_str("\n\n");
                text.push_str(lead);
            }
            self.push_bisected(&mut texts, text);
        }
        texts
    }

    /// Texts over the size ceiling are split once at the character midpoint.
    fn push_bisected(&self, texts: &mut Vec<String>, text: String) {
        let len = text.chars().count();
        if len > self.max_chunk_chars {
            let (first, second) = split_at_char(&text, len / 2);
            texts.push(first.to_string());
            texts.push(second.to_string());
        } else {
            texts.push(text);
        }
    }
}

/// Split pages into header sections.
///
/// Every page opens a new section carrying the full active header stack as
/// prefix; a header line opens a section prefixed with its ancestors only.
/// Blank lines are dropped.
pub(crate) fn split_by_headers<S: AsRef<str>>(pages: &[S]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current = Section::default();

    let flush = |sections: &mut Vec<Section>, current: &mut Section| {
        let section = std::mem::take(current);
        if !section.body.is_empty() {
            sections.push(section);
        }
    };

    for page in pages {
        flush(&mut sections, &mut current);
        current.prefix = stack.iter().map(|(_, h)| h.clone()).collect();

        for line in page.as_ref().lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(caps) = HEADER_LINE.captures(line) {
                flush(&mut sections, &mut current);
                let level = caps[1].len();
                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                current.prefix = stack.iter().map(|(_, h)| h.clone()).collect();
                stack.push((level, format!("{} {}", &caps[1], caps[2].trim_end())));
            }
            current.body.push(line.to_string());
        }
    }
    flush(&mut sections, &mut current);

    sections
}

fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    split_at_char(text, count - n).1
}

fn head_chars(text: &str, n: usize) -> &str {
    split_at_char(text, n).0
}

fn split_at_char(text: &str, index: usize) -> (&str, &str) {
    let byte = text
        .char_indices()
        .nth(index)
        .map_or(text.len(), |(b, _)| b);
    text.split_at(byte)
}

/// Text from the last header line to the end of the page.
fn from_last_header(page: &str) -> Option<&str> {
    HEADER_MULTILINE
        .find_iter(page)
        .last()
        .map(|m| &page[m.start()..])
}

/// Text before the first header line; `None` when there is no header or nothing precedes it.
fn before_first_header(page: &str) -> Option<&str> {
    let m = HEADER_MULTILINE.find(page)?;
    let lead = &page[..m.start()];
    (!lead.trim().is_empty()).then_some(lead)
}
