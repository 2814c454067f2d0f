//! Chat messages

use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    /// The user
    You,
    /// The model
    Assistant,
    /// Instructions and injected context, never shown
    System,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::You => f.write_str("You"),
            Sender::Assistant => f.write_str("Assistant"),
            Sender::System => f.write_str("System"),
        }
    }
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: Sender,
    /// Whether a user message is hidden from the chat view
    #[serde(default)]
    pub is_hidden: bool,
    pub content: String,
}

impl Message {
    /// Create a visible message; content is trimmed of surrounding whitespace
    pub fn new(from: Sender, content: impl AsRef<str>) -> Self {
        Self {
            from,
            is_hidden: false,
            content: content.as_ref().trim().to_string(),
        }
    }

    /// Create a hidden message
    pub fn hidden(from: Sender, content: impl AsRef<str>) -> Self {
        Self {
            is_hidden: true,
            ..Self::new(from, content)
        }
    }

    pub fn is_user_message(&self) -> bool {
        self.from == Sender::You
    }
}
