pub mod agent;
pub mod chunker;
pub mod conversation;
pub mod llm;
pub mod ocr;
pub mod page_merge;
pub mod pipeline;
pub mod rate_limit;
pub mod tools;
pub mod vector_store;

pub use agent::{Agent, ROUTING_SYSTEM_PROMPT};
pub use chunker::{ChunkStrategy, MarkdownChunker, PAGE_BREAK};
pub use conversation::{ConversationStore, EventSink, InMemoryConversationStore, NullSink};
pub use llm::{ChatRequest, LlmBackend, Operation, RateLimitedClient};
pub use ocr::{OcrClient, UploadedFile};
pub use page_merge::PageMerger;
pub use pipeline::{
    IngestPipeline, PipelineOptions, PipelineReport, PipelineStep, load_embeddings,
};
pub use rate_limit::{RateLimiter, TokenUsage};
pub use tools::{Tool, ToolClient};
pub use vector_store::{
    CollectionStatus, UpsertAck, VectorStore, VectorStoreGateway, create_backend,
};
