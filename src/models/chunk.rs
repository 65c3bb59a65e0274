//! Chunk models produced by the chunker and consumed by the embedder.

use serde::{Deserialize, Serialize};

/// A contiguous piece of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Dense 0-based position in document order
    pub id: u64,
    pub text: String,
}

impl Chunk {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ID: {}\nText:\n{}", self.id, self.text)
    }
}

/// A chunk paired with its embedding, as stored in the embeddings artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkWithEmbedding {
    pub id: u64,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

impl ChunkWithEmbedding {
    pub fn new(chunk: Chunk, embedding: Option<Vec<f32>>) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text,
            embedding,
        }
    }
}

/// Drop chunks whose text is empty or whitespace, logging each one.
pub fn filter_empty_chunks(chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks
        .into_iter()
        .filter(|chunk| {
            if chunk.is_blank() {
                tracing::warn!(chunk_id = chunk.id, "skipping empty chunk");
                false
            } else {
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_empty_chunks_keeps_order() {
        let chunks = vec![
            Chunk::new(0, "first"),
            Chunk::new(1, "   \n"),
            Chunk::new(2, ""),
            Chunk::new(3, "last"),
        ];
        let kept = filter_empty_chunks(chunks);
        let ids: Vec<u64> = kept.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 3]);
    }

    #[test]
    fn test_chunk_display() {
        assert_eq!(Chunk::new(2, "abc").to_string(), "ID: 2\nText:\nabc");
    }

    #[test]
    fn test_chunk_with_embedding_deserializes_null() {
        let parsed: ChunkWithEmbedding =
            serde_json::from_str(r#"{"id": 1, "text": "t", "embedding": null}"#).unwrap();
        assert!(parsed.embedding.is_none());
    }
}
