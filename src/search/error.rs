//! Retrieval error types

use thiserror::Error;

use crate::llm::LlmError;
use crate::vector::VectorError;

/// Retrieval errors
#[derive(Debug, Error)]
pub enum SearchError {
    /// The query text could not be embedded
    #[error("Embedding unavailable: {source}")]
    EmbeddingUnavailable {
        #[source]
        source: LlmError,
    },

    #[error("Search timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Store error: {0}")]
    Store(#[from] VectorError),
}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::EmbeddingUnavailable { source } => source.is_retryable(),
            SearchError::Timeout { .. } => true,
            SearchError::Store(e) => e.is_retryable(),
        }
    }
}

/// Result type for retrieval operations
pub type SearchOutcome<T> = Result<T, SearchError>;
