//! Artifact paths and JSON persistence for pipeline steps.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// File layout of the artifacts produced for one OCR'd document.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    dir: PathBuf,
    file_id: String,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>, file_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_id: file_id.into(),
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ocr_json(&self) -> PathBuf {
        self.dir.join(format!("ocr_result_{}.json", self.file_id))
    }

    pub fn ocr_markdown(&self) -> PathBuf {
        self.dir.join(format!("ocr_result_{}.md", self.file_id))
    }

    pub fn chunks(&self) -> PathBuf {
        self.dir
            .join(format!("chunked_ocr_result_{}.json", self.file_id))
    }

    /// Embeddings artifact for a given day.
    pub fn embeddings(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "embeddings_ocr_result_{}_{}.json",
            self.file_id,
            date.format("%Y%m%d")
        ))
    }

    /// Most recent embeddings artifact on disk, by the date suffix.
    ///
    /// Only names whose remainder after this file id is exactly `_YYYYMMDD.json`
    /// match, so `doc` never picks up the artifacts of `doc_2`.
    pub fn latest_embeddings(&self) -> std::io::Result<Option<PathBuf>> {
        let prefix = format!("embeddings_ocr_result_{}_", self.file_id);
        if !self.dir.exists() {
            return Ok(None);
        }

        let mut latest: Option<(NaiveDate, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(date) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|name| name.strip_prefix(&prefix))
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|stamp| NaiveDate::parse_from_str(stamp, "%Y%m%d").ok())
            else {
                continue;
            };
            if latest.as_ref().is_none_or(|(best, _)| date > *best) {
                latest = Some((date, path));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }
}

/// Output path of a question-answering run.
pub fn qa_output_path(dir: &Path, collection: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "qa_{}_{}.json",
        collection,
        at.format("%Y%m%d_%H%M%S")
    ))
}

/// Serialize `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    ensure_parent(path)?;
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> std::io::Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_text(path: &Path, content: &str) -> std::io::Result<()> {
    ensure_parent(path)?;
    fs::write(path, content)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
