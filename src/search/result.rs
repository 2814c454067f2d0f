//! Search results and their prompt renderings

use serde::{Deserialize, Serialize};

use crate::vector::{metadata_keys, ScoredDocument};

/// A ranked match; transient, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub created: String,
    pub updated: String,
    pub score: f32,
}

impl From<ScoredDocument> for SearchResult {
    fn from(scored: ScoredDocument) -> Self {
        let ScoredDocument { document, score } = scored;
        let created = document.meta(metadata_keys::CREATED).unwrap_or_default().to_string();
        let updated = document.meta(metadata_keys::UPDATED).unwrap_or_default().to_string();
        Self {
            id: document.id,
            content: document.content,
            created,
            updated,
            score,
        }
    }
}

impl SearchResult {
    /// Past conversation summary with its time range
    pub fn conversation_string(&self) -> String {
        if self.updated.is_empty() || self.updated == self.created {
            format!("Conversation on {}:\n{}\n\n", self.created, self.content)
        } else {
            format!(
                "Conversation from {} to {}:\n{}\n\n",
                self.created, self.updated, self.content
            )
        }
    }

    /// Fact with its identity and timestamps
    pub fn fact_string(&self) -> String {
        format!(
            "Fact with ID `{}` created on {}, last updated on {}:\n{}\n\n",
            self.id, self.created, self.updated, self.content
        )
    }

    /// Project file keyed by path
    pub fn project_file_string(&self) -> String {
        format!("Project file: {}\n{}\n\n", self.id, self.content)
    }
}
