//! A single named collection of documents
//!
//! Documents live in memory behind a read/write lock and on disk as one
//! JSON file each. Mutations are serialized by a write gate so file writes
//! and map updates never interleave, while queries only take the read lock.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::document::{Document, ScoredDocument};
use super::error::VectorError;
use crate::core::utils::{now_rfc3339, short_hash};
use crate::llm::LanguageModel;
use crate::persist::DurableWriter;

/// Result type for embedding store operations
pub type VectorResult<T> = Result<T, VectorError>;

/// Marker file holding the collection's identity
pub const COLLECTION_META_FILE: &str = "collection.json";

#[derive(Debug, Serialize, Deserialize)]
struct CollectionMeta {
    name: String,
    created: String,
}

/// A named, durable bucket of documents supporting similarity queries
pub struct Collection {
    name: String,
    dir: PathBuf,
    documents: RwLock<HashMap<String, Document>>,
    write_gate: Mutex<()>,
    writer: DurableWriter,
    embedder: Arc<dyn LanguageModel>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl Collection {
    /// Open the collection stored in `dir`, creating it when absent
    pub(crate) async fn open(
        name: &str,
        dir: PathBuf,
        embedder: Arc<dyn LanguageModel>,
    ) -> VectorResult<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_unavailable(&dir, format!("Failed to create collection directory: {}", e)))?;

        let writer = DurableWriter::without_backup();
        let meta_path = dir.join(COLLECTION_META_FILE);

        match tokio::fs::read(&meta_path).await {
            Ok(bytes) => {
                let meta: CollectionMeta = serde_json::from_slice(&bytes)
                    .map_err(|e| storage_unavailable(&meta_path, format!("Corrupt collection metadata: {}", e)))?;
                if meta.name != name {
                    return Err(storage_unavailable(
                        &dir,
                        format!("Directory belongs to collection '{}', not '{}'", meta.name, name),
                    ));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let meta = CollectionMeta {
                    name: name.to_string(),
                    created: now_rfc3339(),
                };
                writer
                    .write_json(&meta_path, &meta)
                    .await
                    .map_err(|e| storage_unavailable(&meta_path, e.to_string()))?;
                debug!("Created collection '{}' at {:?}", name, dir);
            }
            Err(e) => return Err(storage_unavailable(&meta_path, e.to_string())),
        }

        let documents = Self::load_documents(&dir).await?;
        info!("Opened collection '{}' with {} documents", name, documents.len());

        Ok(Self {
            name: name.to_string(),
            dir,
            documents: RwLock::new(documents),
            write_gate: Mutex::new(()),
            writer,
            embedder,
        })
    }

    async fn load_documents(dir: &Path) -> VectorResult<HashMap<String, Document>> {
        let mut documents = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| storage_unavailable(dir, e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_unavailable(dir, e.to_string()))?
        {
            let path = entry.path();
            let is_document = path.extension().map(|ext| ext == "json").unwrap_or(false)
                && path.file_name().map(|n| n != COLLECTION_META_FILE).unwrap_or(false);
            if !is_document {
                continue;
            }

            let loaded = tokio::fs::read(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|bytes| serde_json::from_slice::<Document>(&bytes).map_err(|e| e.to_string()));

            match loaded {
                Ok(document) => {
                    documents.insert(document.id.clone(), document);
                }
                Err(reason) => warn!("Skipping unreadable document file {:?}: {}", path, reason),
            }
        }

        Ok(documents)
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the collection's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", short_hash(id.as_bytes())))
    }

    // ========================================================================
    // CRUD Operations
    // ========================================================================

    /// Insert or overwrite documents
    ///
    /// When the batch repeats an ID, the last copy wins. Documents without
    /// an embedding are embedded first, at most
    /// `concurrency` at a time. Nothing becomes visible unless every
    /// document was embedded, encoded and written.
    pub async fn upsert(&self, documents: Vec<Document>, concurrency: usize) -> VectorResult<()> {
        let documents = dedup_last_wins(documents);
        if documents.is_empty() {
            return Ok(());
        }
        let concurrency = concurrency.clamp(1, documents.len());

        let embedder = Arc::clone(&self.embedder);
        let documents: Vec<Document> = stream::iter(documents)
            .map(|mut document| {
                let embedder = Arc::clone(&embedder);
                async move {
                    if document.embedding.is_empty() {
                        document.embedding = embedder
                            .embed(&document.content)
                            .await
                            .map_err(|source| VectorError::Embedding {
                                id: document.id.clone(),
                                source,
                            })?;
                    }
                    Ok::<_, VectorError>(document)
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        let encoded = documents
            .iter()
            .map(|document| {
                serde_json::to_vec(document)
                    .map(|bytes| (self.document_path(&document.id), bytes))
                    .map_err(|e| VectorError::Serialization {
                        id: document.id.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<VectorResult<Vec<_>>>()?;

        let _gate = self.write_gate.lock().await;

        let expected = match self.dimension().await {
            Some(dimension) => dimension,
            None => documents[0].embedding.len(),
        };
        for document in &documents {
            if document.embedding.len() != expected || expected == 0 {
                return Err(VectorError::InvalidDimension {
                    expected,
                    actual: document.embedding.len(),
                });
            }
        }

        let writer = &self.writer;
        stream::iter(encoded)
            .map(|(path, bytes)| async move { writer.write(&path, &bytes).await })
            .buffer_unordered(concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        let count = documents.len();
        let mut map = self.documents.write().await;
        for document in documents {
            map.insert(document.id.clone(), document);
        }
        debug!("Upserted {} documents into '{}'", count, self.name);

        Ok(())
    }

    /// Fetch a document by ID
    pub async fn get_by_id(&self, id: &str) -> VectorResult<Document> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| VectorError::NotFound {
                collection: self.name.clone(),
                id: id.to_string(),
            })
    }

    /// Remove documents by ID; absent IDs are ignored
    ///
    /// Returns the number of documents actually removed.
    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> VectorResult<usize> {
        let _gate = self.write_gate.lock().await;
        let mut removed = 0;

        for id in ids {
            let id = id.as_ref();
            if !self.documents.read().await.contains_key(id) {
                continue;
            }

            let path = self.document_path(id);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(storage_unavailable(&path, e.to_string())),
            }

            self.documents.write().await.remove(id);
            removed += 1;
        }

        if removed > 0 {
            debug!("Deleted {} documents from '{}'", removed, self.name);
        }
        Ok(removed)
    }

    /// Remove every document
    pub async fn clear(&self) -> VectorResult<usize> {
        let ids: Vec<String> = self.documents.read().await.keys().cloned().collect();
        self.delete(&ids).await
    }

    /// Number of documents
    pub async fn count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Snapshot of every document, ordered by ID
    pub async fn documents(&self) -> Vec<Document> {
        let mut documents: Vec<Document> = self.documents.read().await.values().cloned().collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        documents
    }

    /// Sorted document IDs
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.documents.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Embedding dimension of the stored documents, if any are stored
    pub async fn dimension(&self) -> Option<usize> {
        self.documents
            .read()
            .await
            .values()
            .next()
            .map(|document| document.embedding.len())
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// The `k` documents most similar to `embedding`
    ///
    /// Results are ordered by descending cosine similarity, ties by
    /// ascending ID. `k` is capped at the collection size.
    pub async fn query(&self, embedding: &[f32], k: usize) -> VectorResult<Vec<ScoredDocument>> {
        let documents = self.documents.read().await;
        if documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if let Some(stored) = documents.values().next() {
            if stored.embedding.len() != embedding.len() {
                return Err(VectorError::InvalidDimension {
                    expected: stored.embedding.len(),
                    actual: embedding.len(),
                });
            }
        }

        let mut scored: Vec<(&Document, f32)> = documents
            .values()
            .map(|document| (document, cosine_similarity(embedding, &document.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        let results: Vec<ScoredDocument> = scored
            .into_iter()
            .take(k)
            .map(|(document, score)| ScoredDocument {
                document: document.clone(),
                score,
            })
            .collect();

        debug!(
            "Query on '{}' returned {} results (k: {})",
            self.name,
            results.len(),
            k
        );

        Ok(results)
    }
}

/// Cosine similarity between two vectors
///
/// Returns 0 when either vector is empty or has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Keep only the last document for each ID, in batch order
fn dedup_last_wins(documents: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::with_capacity(documents.len());
    let mut kept: Vec<Document> = documents
        .into_iter()
        .rev()
        .filter(|document| seen.insert(document.id.clone()))
        .collect();
    kept.reverse();
    kept
}

fn storage_unavailable(path: &Path, reason: impl Into<String>) -> VectorError {
    VectorError::StorageUnavailable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
