//! fnord - semantic memory for a terminal chat assistant
//!
//! This crate provides the storage and retrieval core:
//! - Embedding store with named, durable document collections
//! - Conversation ledger with crash-safe persistence and summaries
//! - Fact store for long-term assistant memory
//! - Incremental project indexer driven by filesystem events
//! - Retrieval gateway that turns text into ranked context

pub mod core;
pub mod facts;
pub mod indexer;
pub mod ledger;
pub mod llm;
pub mod logging;
pub mod persist;
pub mod search;
pub mod session;
pub mod vector;
pub mod watcher;
pub mod workspace;

// Re-export commonly used items
pub use core::config::AppConfig;
pub use core::error::{FnordError, Result};
pub use facts::{Fact, FactStore};
pub use indexer::{IndexError, IndexerHandle, IndexerState, ProjectIndexer};
pub use ledger::{Conversation, ConversationLedger, Message, Sender};
pub use llm::{LanguageModel, LlmError, OfflineModel, OpenAiClient};
pub use search::{RetrievalGateway, SearchError, SearchResult};
pub use session::ChatSession;
pub use vector::{Collection, Document, EmbeddingStore, VectorError};
pub use workspace::Workspace;
