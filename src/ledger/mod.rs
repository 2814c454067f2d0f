//! Conversation ledger
//!
//! Message history with a derived summary and embedding, persisted with
//! the durable record writer and published to the box's conversations
//! collection for retrieval.

mod conversation;
mod error;
mod message;
mod persister;
mod store;


pub use conversation::Conversation;
pub use error::{LedgerError, LedgerResult};
pub use message::{Message, Sender};
pub use persister::{
    ConversationPersister, PersistQueue, PersisterHandle, SharedConversation, SUMMARY_PROMPT,
};
pub use store::{
    ConversationLedger, EmbeddingRecord, IndexEntry, SaveReport, EMBEDDINGS_FILE, INDEX_FILE,
    MESSAGES_FILE,
};
