//! Embedding store error types

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;
use crate::persist::PersistError;

/// Embedding store specific errors
#[derive(Error, Debug)]
pub enum VectorError {
    #[error("Storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("Document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("Failed to encode document '{id}': {reason}")]
    Serialization { id: String, reason: String },

    #[error("Failed to embed document '{id}': {source}")]
    Embedding {
        id: String,
        #[source]
        source: LlmError,
    },

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Persistence failed: {0}")]
    Persist(#[from] PersistError),
}

impl VectorError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            VectorError::Embedding { source, .. } => source.is_retryable(),
            VectorError::Persist(PersistError::Io { .. }) => true,
            _ => false,
        }
    }

    /// Check if the error reports a missing document
    pub fn is_not_found(&self) -> bool {
        matches!(self, VectorError::NotFound { .. })
    }
}
