//! On-disk conversation ledger
//!
//! Layout under the ledger directory:
//! - `index.jsonl`: one `{start, end, uuid, summary}` entry per conversation
//! - `<uuid>/messages.jsonl`: the full transcript, one message per line
//! - `<uuid>/embeddings.json`: `{uuid, hash, embedding}` for the summary

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::conversation::Conversation;
use super::error::{LedgerError, LedgerResult};
use super::message::Message;
use crate::persist::{DurableWriter, PersistError};
use crate::vector::{concurrency, metadata_keys, Collection, Document};

/// Index file name
pub const INDEX_FILE: &str = "index.jsonl";
/// Transcript file name inside a conversation directory
pub const MESSAGES_FILE: &str = "messages.jsonl";
/// Embedding record file name inside a conversation directory
pub const EMBEDDINGS_FILE: &str = "embeddings.json";

/// One line of the conversation index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "start")]
    pub created: DateTime<Utc>,
    #[serde(rename = "end")]
    pub modified: DateTime<Utc>,
    pub uuid: Uuid,
    pub summary: String,
}

impl From<&Conversation> for IndexEntry {
    fn from(conversation: &Conversation) -> Self {
        Self {
            created: conversation.created(),
            modified: conversation.modified(),
            uuid: conversation.uuid(),
            summary: conversation.summary().to_string(),
        }
    }
}

/// Persisted summary embedding of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub uuid: Uuid,
    pub hash: String,
    pub embedding: Vec<f32>,
}

/// Outcome of each independent step of [`ConversationLedger::save`]
#[derive(Debug)]
pub struct SaveReport {
    pub index: Result<(), PersistError>,
    pub embedding: Result<(), PersistError>,
    pub transcript: Result<(), PersistError>,
}

impl SaveReport {
    /// Every step succeeded
    pub fn is_complete(&self) -> bool {
        self.index.is_ok() && self.embedding.is_ok() && self.transcript.is_ok()
    }

    /// Failed steps by name
    pub fn failures(&self) -> Vec<(&'static str, &PersistError)> {
        [
            ("index", &self.index),
            ("embedding", &self.embedding),
            ("transcript", &self.transcript),
        ]
        .into_iter()
        .filter_map(|(step, result)| result.as_ref().err().map(|e| (step, e)))
        .collect()
    }
}

/// Conversation persistence for one box
pub struct ConversationLedger {
    dir: PathBuf,
    writer: DurableWriter,
    save_lock: Mutex<()>,
    collection: Option<Arc<Collection>>,
}

impl std::fmt::Debug for ConversationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLedger")
            .field("dir", &self.dir)
            .field("collection", &self.collection.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

impl ConversationLedger {
    /// Ledger rooted at `dir`; nothing is created until the first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: DurableWriter::new(),
            save_lock: Mutex::new(()),
            collection: None,
        }
    }

    /// Publish summaries into `collection` for retrieval
    pub fn with_collection(mut self, collection: Arc<Collection>) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn conversation_dir(&self, uuid: Uuid) -> PathBuf {
        self.dir.join(uuid.to_string())
    }

    pub fn messages_path(&self, uuid: Uuid) -> PathBuf {
        self.conversation_dir(uuid).join(MESSAGES_FILE)
    }

    pub fn embeddings_path(&self, uuid: Uuid) -> PathBuf {
        self.conversation_dir(uuid).join(EMBEDDINGS_FILE)
    }

    /// Start a new, unsaved conversation
    pub fn new_conversation(&self) -> Conversation {
        Conversation::new()
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Persist the conversation in three independent steps
    ///
    /// Each step is attempted even if an earlier one failed; failures are
    /// logged and reported, never raised.
    pub async fn save(&self, conversation: &Conversation) -> SaveReport {
        let _guard = self.save_lock.lock().await;

        let report = SaveReport {
            index: self.save_index_entry(conversation).await,
            embedding: self.save_embedding(conversation).await,
            transcript: self.save_transcript(conversation).await,
        };

        for (step, error) in report.failures() {
            warn!(
                conversation = %conversation.uuid(),
                step,
                "Failed to save conversation {}: {}",
                step,
                error
            );
        }
        if report.is_complete() {
            debug!("Saved conversation {} ({} messages)", conversation.uuid(), conversation.messages().len());
        }

        report
    }

    /// Rewrite the index with this conversation's entry first and any
    /// previous entry for the same UUID dropped
    async fn save_index_entry(&self, conversation: &Conversation) -> Result<(), PersistError> {
        let index_path = self.index_path();
        let entry = IndexEntry::from(conversation);

        let mut bytes = serde_json::to_vec(&entry).map_err(|e| PersistError::Serialization {
            path: index_path.clone(),
            reason: e.to_string(),
        })?;
        bytes.push(b'\n');

        let existing = match tokio::fs::read_to_string(&index_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(PersistError::Io {
                    path: index_path,
                    source: e,
                })
            }
        };

        for line in existing.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<IndexEntry>(line) {
                Ok(other) if other.uuid == entry.uuid => continue,
                Ok(_) => {}
                Err(e) => warn!("Keeping unparseable index line in {:?}: {}", index_path, e),
            }
            bytes.extend_from_slice(line.as_bytes());
            bytes.push(b'\n');
        }

        self.writer.write(&index_path, &bytes).await
    }

    async fn save_embedding(&self, conversation: &Conversation) -> Result<(), PersistError> {
        let record = EmbeddingRecord {
            uuid: conversation.uuid(),
            hash: conversation.hash().to_string(),
            embedding: conversation.embedding().to_vec(),
        };
        self.writer
            .write_json(&self.embeddings_path(conversation.uuid()), &record)
            .await
    }

    async fn save_transcript(&self, conversation: &Conversation) -> Result<(), PersistError> {
        self.writer
            .write_lines(&self.messages_path(conversation.uuid()), conversation.messages())
            .await
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Index entries, most recently saved first
    pub async fn list_conversations(&self) -> LedgerResult<Vec<IndexEntry>> {
        let index_path = self.index_path();
        let content = match tokio::fs::read_to_string(&index_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LedgerError::Io {
                    path: index_path,
                    source: e,
                })
            }
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                    path: index_path.clone(),
                    line: n + 1,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Reload a conversation from the index, embedding record and transcript
    pub async fn load_conversation(&self, uuid: Uuid) -> LedgerResult<Conversation> {
        let entry = self
            .list_conversations()
            .await?
            .into_iter()
            .find(|entry| entry.uuid == uuid)
            .ok_or(LedgerError::NotFound { uuid })?;

        let messages_path = self.messages_path(uuid);
        let transcript = match tokio::fs::read_to_string(&messages_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(LedgerError::Io {
                    path: messages_path,
                    source: e,
                })
            }
        };

        let messages = transcript
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<Message>(line).map_err(|e| LedgerError::Corrupt {
                    path: messages_path.clone(),
                    line: n + 1,
                    reason: e.to_string(),
                })
            })
            .collect::<LedgerResult<Vec<_>>>()?;

        let embeddings_path = self.embeddings_path(uuid);
        let (embedding, hash) = match tokio::fs::read(&embeddings_path).await {
            Ok(bytes) => {
                let record: EmbeddingRecord =
                    serde_json::from_slice(&bytes).map_err(|e| LedgerError::Corrupt {
                        path: embeddings_path.clone(),
                        line: 1,
                        reason: e.to_string(),
                    })?;
                (record.embedding, record.hash)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), String::new()),
            Err(e) => {
                return Err(LedgerError::Io {
                    path: embeddings_path,
                    source: e,
                })
            }
        };

        Ok(Conversation::restore(
            entry.uuid,
            entry.created,
            entry.modified,
            entry.summary,
            embedding,
            hash,
            messages,
        ))
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// Upsert the conversation summary into the retrieval collection
    ///
    /// Returns false when there is nothing to publish: no collection, an
    /// empty summary, or an embedding that does not match the summary.
    pub async fn publish(&self, conversation: &Conversation) -> LedgerResult<bool> {
        let Some(collection) = &self.collection else {
            return Ok(false);
        };
        if conversation.summary().is_empty()
            || conversation.embedding().is_empty()
            || conversation.has_stale_embedding()
        {
            return Ok(false);
        }

        let document = Document::new(conversation.uuid().to_string(), conversation.summary())
            .with_metadata(metadata_keys::CREATED, conversation.created().to_rfc3339_opts(SecondsFormat::Micros, true))
            .with_metadata(metadata_keys::UPDATED, conversation.modified().to_rfc3339_opts(SecondsFormat::Micros, true))
            .with_embedding(conversation.embedding().to_vec());

        collection.upsert(vec![document], concurrency::SINGLE).await?;
        debug!("Published conversation {} to '{}'", conversation.uuid(), collection.name());
        Ok(true)
    }
}
