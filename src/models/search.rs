//! Vector store records and output formatting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::chunk::ChunkWithEmbedding;
use crate::error::VectorStoreError;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// A vector with its id and JSON payload, ready for upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: u64,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl Point {
    pub fn new(id: u64, vector: Vec<f32>) -> Self {
        Self {
            id,
            vector,
            payload: Map::new(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

impl TryFrom<ChunkWithEmbedding> for Point {
    type Error = VectorStoreError;

    /// Chunks without an embedding cannot be stored.
    fn try_from(chunk: ChunkWithEmbedding) -> Result<Self, Self::Error> {
        let vector = chunk
            .embedding
            .ok_or(VectorStoreError::MissingEmbedding(chunk.id))?;
        Ok(Point::new(chunk.id, vector)
            .with_payload("id", chunk.id)
            .with_payload("text", chunk.text))
    }
}

/// A query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ScoredPoint {
    /// Text stored in the payload, if any.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }
}

/// Summary of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
    pub dimension: u64,
    pub distance: super::config::DistanceMetric,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_point_from_chunk() {
        let chunk = ChunkWithEmbedding {
            id: 4,
            text: "hello".to_string(),
            embedding: Some(vec![0.1, 0.2]),
        };
        let point = Point::try_from(chunk).unwrap();
        assert_eq!(point.id, 4);
        assert_eq!(point.vector, vec![0.1, 0.2]);
        assert_eq!(point.payload["text"], "hello");
        assert_eq!(point.payload["id"], 4);
    }

    #[test]
    fn test_point_from_chunk_without_embedding_fails() {
        let chunk = ChunkWithEmbedding {
            id: 9,
            text: "orphan".to_string(),
            embedding: None,
        };
        let err = Point::try_from(chunk).unwrap_err();
        assert!(matches!(err, VectorStoreError::MissingEmbedding(9)));
    }

    #[test]
    fn test_scored_point_text() {
        let point = ScoredPoint {
            id: 1,
            score: 0.9,
            payload: Point::new(1, vec![]).with_payload("text", "body").payload,
        };
        assert_eq!(point.text(), Some("body"));
    }
}
