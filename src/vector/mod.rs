//! Embedding store module
//!
//! Durable, queryable collections of documents with cosine similarity
//! search over a linear scan. Collections are keyed by namespaced names
//! (see [`names`]) and shared process-wide through [`EmbeddingStore`].

mod collection;
mod document;
mod error;
mod store;


pub use collection::{cosine_similarity, Collection, VectorResult};
pub use document::{Document, ScoredDocument};
pub use error::VectorError;
pub use store::EmbeddingStore;

/// Reserved metadata keys
pub mod metadata_keys {
    /// Creation timestamp (RFC 3339)
    pub const CREATED: &str = "created";
    /// Last update timestamp (RFC 3339)
    pub const UPDATED: &str = "updated";
    /// Change marker
    pub const HASH: &str = "hash";
    /// BLAKE3 digest of the indexed content
    pub const DIGEST: &str = "digest";
}

/// Collection naming conventions
pub mod names {
    use std::path::Path;

    pub const CONVERSATIONS_PREFIX: &str = "conversations:";
    pub const FACTS_PREFIX: &str = "facts:";
    pub const PROJECT_FILES_PREFIX: &str = "project_files:";

    /// Conversation summaries of a box
    pub fn conversations(box_name: &str) -> String {
        format!("{}{}", CONVERSATIONS_PREFIX, box_name)
    }

    /// Facts of a box
    pub fn facts(box_name: &str) -> String {
        format!("{}{}", FACTS_PREFIX, box_name)
    }

    /// Indexed files of a project root
    pub fn project_files(root: &Path) -> String {
        format!("{}{}", PROJECT_FILES_PREFIX, root.display())
    }
}

/// Upsert parallelism used by the stores
pub mod concurrency {
    /// Initial project scan
    pub const BULK_INDEX: usize = 4;
    /// A single file or conversation
    pub const SINGLE: usize = 2;
    /// A single fact
    pub const FACT: usize = 1;
}
