mod chunk;
mod config;
mod conversation;
mod ocr;
mod search;

pub use chunk::{Chunk, ChunkWithEmbedding, filter_empty_chunks};
pub use config::{
    AgentConfig, ChunkingConfig, Config, DEFAULT_EMBED_MODEL, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_JINA_URL, DEFAULT_MISTRAL_URL, DistanceMetric,
    EmbeddingConfig, EmbeddingProvider, LlmConfig, LlmProvider, LoggingConfig, OcrConfig,
    PipelineConfig, RateLimitConfig, RetrievalConfig, ServerConfig, VectorStoreConfig,
};
pub use conversation::{
    ConversationEntry, FunctionCall, InputMessage, OutputMessage, Role, ToolCall,
};
pub use ocr::{OcrResponse, OcrUsage, Page, PageImage};
pub use search::{CollectionInfo, OutputFormat, Point, ScoredPoint};
