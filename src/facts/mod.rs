//! Fact store
//!
//! Long-term memory of discrete facts, one collection per box. Facts are
//! addressed by a generated identifier and searched by similarity.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::utils::{generate_uuid, now_rfc3339};
use crate::llm::LanguageModel;
use crate::search::{embed_and_query, SearchOutcome, SearchResult};
use crate::vector::{concurrency, metadata_keys, Collection, Document, VectorResult};


/// A stored fact
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub id: String,
    pub content: String,
    pub created: String,
    pub updated: String,
}

impl From<Document> for Fact {
    fn from(doc: Document) -> Self {
        let created = doc.meta(metadata_keys::CREATED).unwrap_or_default().to_string();
        let updated = doc.meta(metadata_keys::UPDATED).unwrap_or_default().to_string();
        Self {
            id: doc.id,
            content: doc.content,
            created,
            updated,
        }
    }
}

/// CRUD and similarity search over the facts collection
pub struct FactStore {
    collection: Arc<Collection>,
    llm: Arc<dyn LanguageModel>,
    search_timeout: Option<Duration>,
}

impl FactStore {
    pub fn new(collection: Arc<Collection>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            collection,
            llm,
            search_timeout: None,
        }
    }

    pub fn with_search_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    /// Store a new fact and return its identifier
    pub async fn create(&self, content: &str) -> VectorResult<String> {
        let id = generate_uuid().to_string();
        let now = now_rfc3339();
        let doc = Document::new(id.clone(), content)
            .with_metadata(metadata_keys::CREATED, now.clone())
            .with_metadata(metadata_keys::UPDATED, now);

        self.collection.upsert(vec![doc], concurrency::FACT).await?;
        info!("Created fact {}", id);
        Ok(id)
    }

    /// Content of the fact with `id`
    pub async fn read(&self, id: &str) -> VectorResult<String> {
        Ok(self.collection.get_by_id(id).await?.content)
    }

    pub async fn get(&self, id: &str) -> VectorResult<Fact> {
        Ok(Fact::from(self.collection.get_by_id(id).await?))
    }

    /// Replace the content of an existing fact
    ///
    /// The creation time is kept; unknown identifiers are `NotFound`.
    pub async fn update(&self, id: &str, content: &str) -> VectorResult<()> {
        let existing = self.collection.get_by_id(id).await?;
        let created = existing
            .meta(metadata_keys::CREATED)
            .map(str::to_string)
            .unwrap_or_else(now_rfc3339);

        let doc = Document::new(id, content)
            .with_metadata(metadata_keys::CREATED, created)
            .with_metadata(metadata_keys::UPDATED, now_rfc3339());

        self.collection.upsert(vec![doc], concurrency::FACT).await?;
        info!("Updated fact {}", id);
        Ok(())
    }

    /// Remove a fact; returns whether it existed
    pub async fn delete(&self, id: &str) -> VectorResult<bool> {
        let removed = self.collection.delete(&[id]).await?;
        debug!("Deleted fact {} ({} removed)", id, removed);
        Ok(removed > 0)
    }

    /// All facts, oldest first
    pub async fn list(&self) -> Vec<Fact> {
        let mut facts: Vec<Fact> = self
            .collection
            .documents()
            .await
            .into_iter()
            .map(Fact::from)
            .collect();
        facts.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        facts
    }

    pub async fn count(&self) -> usize {
        self.collection.count().await
    }

    /// Forget every fact in the box
    pub async fn reset(&self) -> VectorResult<usize> {
        let removed = self.collection.clear().await?;
        info!("Reset fact store '{}' ({} facts removed)", self.collection.name(), removed);
        Ok(removed)
    }

    /// Facts ranked by similarity to `text`
    pub async fn search(&self, text: &str, k: usize) -> SearchOutcome<Vec<SearchResult>> {
        embed_and_query(self.llm.as_ref(), &self.collection, text, k, self.search_timeout).await
    }
}
