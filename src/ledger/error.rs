//! Conversation ledger error types

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::persist::PersistError;
use crate::vector::VectorError;

/// Conversation ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Conversation not found: {uuid}")]
    NotFound { uuid: Uuid },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record in {path} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Persistence failed: {0}")]
    Persist(#[from] PersistError),

    #[error("Failed to publish conversation: {0}")]
    Store(#[from] VectorError),

    #[error("Conversation persister has shut down")]
    PersisterClosed,
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
