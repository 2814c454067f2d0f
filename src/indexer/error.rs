//! Error types for the indexer module

use std::path::PathBuf;
use thiserror::Error;

use crate::vector::VectorError;
use crate::watcher::WatcherError;

/// Errors that can occur during indexing operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Project root is not under version control: {root:?}")]
    NotVersionControlled { root: PathBuf },

    #[error("Unusable ignore file {path:?}: {reason}")]
    IgnoreFile { path: PathBuf, reason: String },

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch error: {0}")]
    Watch(#[from] WatcherError),

    #[error("Store error: {0}")]
    Store(#[from] VectorError),

    #[error("Background task failed: {reason}")]
    Task { reason: String },
}

impl IndexError {
    /// Whether this error prevents the indexer from starting at all
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            IndexError::NotVersionControlled { .. } | IndexError::IgnoreFile { .. }
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::Io { .. } => true,
            IndexError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}
