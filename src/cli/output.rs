use serde::Serialize;
use serde_json::json;

use crate::models::{Chunk, CollectionInfo, OutputFormat, ScoredPoint};
use crate::services::PipelineReport;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_pipeline_report(&self, report: &PipelineReport) -> String;
    fn format_collection(&self, info: &CollectionInfo) -> String;
    fn format_chunks(&self, chunks: &[Chunk]) -> String;
    fn format_answers(&self, answers: &[QaRecord]) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub collection: String,
    pub results: Vec<ScoredPoint>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub chat_provider: String,
    pub chat_model: String,
    pub chat_key_set: bool,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_key_set: bool,
    pub ocr_key_set: bool,
    pub vector_store_driver: String,
    pub vector_store_location: String,
    pub vector_store_connected: bool,
    pub collection: Option<CollectionInfo>,
}

/// One answered question of an `ask` run.
#[derive(Debug, Clone, Serialize)]
pub struct QaRecord {
    pub id: usize,
    pub question: String,
    pub answer: String,
}

pub struct TextFormatter;

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.results.is_empty() {
            return format!(
                "No results found in '{}' for: {}\n",
                results.collection, results.query
            );
        }

        let mut output = format!(
            "Search results for: \"{}\"\nFound {} results in {}ms\n\n",
            results.query,
            results.results.len(),
            results.duration_ms
        );

        for (i, result) in results.results.iter().enumerate() {
            output.push_str(&format!(
                "{}. [Score: {:.3}] chunk {}\n   ---\n",
                i + 1,
                result.score,
                result.id
            ));

            let content = result.text().unwrap_or_default();
            let preview: String = content.chars().take(200).collect();
            let ellipsis = if content.chars().count() > 200 { "..." } else { "" };
            for line in format!("{}{}", preview, ellipsis).lines() {
                output.push_str(&format!("   {}\n", line));
            }
            output.push('\n');
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::from("Status\n------\n");
        output.push_str(&format!(
            "Chat model:    {} {} ({})\n",
            mark(status.chat_key_set),
            status.chat_model,
            status.chat_provider
        ));
        output.push_str(&format!(
            "Embeddings:    {} {} ({})\n",
            mark(status.embedding_key_set),
            status.embedding_model,
            status.embedding_provider
        ));
        output.push_str(&format!("OCR:           {}\n\n", mark(status.ocr_key_set)));

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        output.push_str(&format!(
            "Vector Store:  {} ({})\n  Location:    {}\n",
            status.vector_store_driver, vector_status, status.vector_store_location
        ));
        if let Some(info) = &status.collection {
            output.push_str(&format!(
                "  Collection:  {}\n  Points:      {}\n",
                info.name, info.points_count
            ));
        }

        output
    }

    fn format_pipeline_report(&self, report: &PipelineReport) -> String {
        let steps: Vec<String> = report.steps.iter().map(ToString::to_string).collect();
        let mut output = String::from("Ingestion Complete\n------------------\n");
        output.push_str(&format!("File id:     {}\n", report.file_id));
        output.push_str(&format!("Collection:  {}\n", report.collection));
        output.push_str(&format!("Steps:       {}\n", steps.join(", ")));
        if let Some(pages) = report.pages {
            output.push_str(&format!("Pages:       {}\n", pages));
        }
        if let Some(chunks) = report.chunks {
            output.push_str(&format!("Chunks:      {}\n", chunks));
        }
        if let Some(embedded) = report.embedded {
            output.push_str(&format!("Embedded:    {}\n", embedded));
        }
        if let Some(upserted) = report.upserted {
            output.push_str(&format!("Upserted:    {}\n", upserted));
        }
        for artifact in &report.artifacts {
            output.push_str(&format!("  wrote {}\n", artifact.display()));
        }
        output
    }

    fn format_collection(&self, info: &CollectionInfo) -> String {
        format!(
            "Collection:  {}\n  Points:    {}\n  Dimension: {}\n  Distance:  {}\n",
            info.name, info.points_count, info.dimension, info.distance
        )
    }

    fn format_chunks(&self, chunks: &[Chunk]) -> String {
        let mut output = String::new();
        for chunk in chunks {
            output.push_str(&format!(
                "--- chunk {} ({} chars) ---\n{}\n\n",
                chunk.id,
                chunk.char_len(),
                chunk.text
            ));
        }
        output.push_str(&format!("{} chunks\n", chunks.len()));
        output
    }

    fn format_answers(&self, answers: &[QaRecord]) -> String {
        let mut output = String::new();
        for record in answers {
            output.push_str(&format!(
                "# Question {:02}: \"{}\"\n# Answer: \"{}\"\n\n",
                record.id, record.question, record.answer
            ));
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| json!({"error": e.to_string()}).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(&json!({
            "chat": {
                "provider": status.chat_provider,
                "model": status.chat_model,
                "api_key_set": status.chat_key_set,
            },
            "embedding": {
                "provider": status.embedding_provider,
                "model": status.embedding_model,
                "api_key_set": status.embedding_key_set,
            },
            "ocr": {
                "api_key_set": status.ocr_key_set,
            },
            "vector_store": {
                "driver": status.vector_store_driver,
                "location": status.vector_store_location,
                "connected": status.vector_store_connected,
                "collection": status.collection,
            }
        }))
    }

    fn format_pipeline_report(&self, report: &PipelineReport) -> String {
        self.render(report)
    }

    fn format_collection(&self, info: &CollectionInfo) -> String {
        self.render(info)
    }

    fn format_chunks(&self, chunks: &[Chunk]) -> String {
        self.render(chunks)
    }

    fn format_answers(&self, answers: &[QaRecord]) -> String {
        self.render(answers)
    }

    fn format_message(&self, message: &str) -> String {
        json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        json!({"error": error}).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
