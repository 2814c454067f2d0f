//! In-memory conversation state

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::message::{Message, Sender};
use crate::core::utils::{generate_uuid, sha256_hex};

/// A conversation and its derived summary
///
/// `summary` and `embedding` are derived from the messages and refreshed
/// only after assistant replies; `hash` records which summary the embedding
/// was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    uuid: Uuid,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    summary: String,
    embedding: Vec<f32>,
    hash: String,
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Fresh conversation with a new identifier and no messages
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            uuid: generate_uuid(),
            created: now,
            modified: now,
            summary: String::new(),
            embedding: Vec::new(),
            hash: String::new(),
            messages: Vec::new(),
        }
    }

    /// Rebuild a conversation from its persisted parts
    pub(crate) fn restore(
        uuid: Uuid,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
        summary: String,
        embedding: Vec<f32>,
        hash: String,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            uuid,
            created,
            modified: modified.max(created),
            summary,
            embedding,
            hash,
            messages,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    /// SHA-256 of the summary the embedding belongs to
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a message and bump `modified`; does not persist
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.modified = Utc::now().max(self.created);
    }

    /// Replace summary and embedding and rehash the summary
    pub fn set_summary(&mut self, summary: impl Into<String>, embedding: Vec<f32>) {
        self.summary = summary.into();
        self.embedding = embedding;
        self.hash = sha256_hex(&self.summary);
    }

    /// True when the embedding was not computed for the current summary
    pub fn has_stale_embedding(&self) -> bool {
        self.hash != sha256_hex(&self.summary)
    }

    /// Whether the last message was written by the assistant
    pub fn awaiting_user(&self) -> bool {
        matches!(self.last_message(), Some(m) if m.from == Sender::Assistant)
    }

    /// Every message, system included; used as embedding input
    pub fn transcript(&self) -> String {
        render(self.messages.iter())
    }

    /// Messages without system entries; the visible history
    pub fn chat_transcript(&self) -> String {
        render(self.messages.iter().filter(|m| m.from != Sender::System))
    }
}

fn render<'a>(messages: impl Iterator<Item = &'a Message>) -> String {
    let mut buf = String::new();
    for message in messages {
        buf.push_str(&format!("{}:\n\n{}\n\n", message.from, message.content));
    }
    buf
}
