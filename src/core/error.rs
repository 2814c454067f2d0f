//! Error types for fnord
//!
//! Each module owns its error enum; [`FnordError`] aggregates them for
//! callers that cross module boundaries.

use thiserror::Error;

use super::config::ConfigError;
use crate::indexer::IndexError;
use crate::ledger::LedgerError;
use crate::llm::LlmError;
use crate::logging::LoggingError;
use crate::persist::PersistError;
use crate::search::SearchError;
use crate::vector::VectorError;

/// Result type alias for fnord operations
pub type Result<T> = std::result::Result<T, FnordError>;

/// Main error type for fnord
#[derive(Error, Debug)]
pub enum FnordError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] VectorError),

    #[error("Conversation error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FnordError {
    /// Check if the error reports a missing record
    pub fn is_not_found(&self) -> bool {
        match self {
            FnordError::Store(e) => e.is_not_found(),
            FnordError::Ledger(e) => e.is_not_found(),
            _ => false,
        }
    }
}
