//! Stored documents

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The atomic stored unit of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique within its collection
    pub id: String,
    /// Text content
    pub content: String,
    /// Free-form string metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Embedding vector; computed on upsert when empty
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Document {
    /// Create a document without metadata or embedding
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: HashMap::new(),
            embedding: Vec::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a precomputed embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Metadata value for `key`, if present
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// A document paired with its similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}
