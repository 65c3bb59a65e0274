//! Utility modules.

pub mod file;
pub mod retry;

pub use file::{ArtifactPaths, qa_output_path, read_json, write_json, write_text};
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
