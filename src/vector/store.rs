//! EmbeddingStore: the root of all collections
//!
//! Each collection lives in its own directory under the store root, named
//! by a short hash of the collection name. Opened collections are cached so
//! every consumer in the process shares one in-memory view per collection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::collection::{Collection, VectorResult, COLLECTION_META_FILE};
use super::error::VectorError;
use super::names;
use crate::core::utils::short_hash;
use crate::llm::LanguageModel;

/// Persistent store of named document collections
pub struct EmbeddingStore {
    root: PathBuf,
    embedder: Arc<dyn LanguageModel>,
    collections: DashMap<String, Arc<Collection>>,
    open_lock: Mutex<()>,
}

impl std::fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingStore")
            .field("root", &self.root)
            .field("open_collections", &self.collections.len())
            .finish_non_exhaustive()
    }
}

impl EmbeddingStore {
    /// Open the store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>, embedder: Arc<dyn LanguageModel>) -> VectorResult<Self> {
        let root = root.into();

        info!("Opening EmbeddingStore at {:?} (embedder: {})", root, embedder.name());

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| VectorError::StorageUnavailable {
                path: root.clone(),
                reason: format!("Failed to create storage directory: {}", e),
            })?;

        Ok(Self {
            root,
            embedder,
            collections: DashMap::new(),
            open_lock: Mutex::new(()),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the named collection, creating empty storage when absent
    ///
    /// Idempotent: repeated calls return the same shared collection.
    pub async fn open_or_create_collection(&self, name: &str) -> VectorResult<Arc<Collection>> {
        if let Some(collection) = self.collections.get(name) {
            return Ok(Arc::clone(collection.value()));
        }

        let _guard = self.open_lock.lock().await;
        if let Some(collection) = self.collections.get(name) {
            return Ok(Arc::clone(collection.value()));
        }

        let dir = self.root.join(short_hash(name.as_bytes()));
        let collection = Arc::new(Collection::open(name, dir, Arc::clone(&self.embedder)).await?);
        self.collections.insert(name.to_string(), Arc::clone(&collection));

        Ok(collection)
    }

    /// Names of every collection on disk, sorted
    pub async fn list_collections(&self) -> VectorResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| VectorError::StorageUnavailable {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let meta_path = entry.path().join(COLLECTION_META_FILE);
            let bytes = match tokio::fs::read(&meta_path).await {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };

            match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(meta) => {
                    if let Some(name) = meta.get("name").and_then(|n| n.as_str()) {
                        names.push(name.to_string());
                    }
                }
                Err(e) => warn!("Unreadable collection metadata {:?}: {}", meta_path, e),
            }
        }

        names.sort();
        debug!("Found {} collections under {:?}", names.len(), self.root);
        Ok(names)
    }

    /// Box names that have a conversations collection
    pub async fn list_boxes(&self) -> VectorResult<Vec<String>> {
        self.list_with_prefix(names::CONVERSATIONS_PREFIX).await
    }

    /// Project roots that have a project files collection
    pub async fn list_projects(&self) -> VectorResult<Vec<String>> {
        self.list_with_prefix(names::PROJECT_FILES_PREFIX).await
    }

    async fn list_with_prefix(&self, prefix: &str) -> VectorResult<Vec<String>> {
        Ok(self
            .list_collections()
            .await?
            .into_iter()
            .filter_map(|name| name.strip_prefix(prefix).map(str::to_string))
            .collect())
    }
}
