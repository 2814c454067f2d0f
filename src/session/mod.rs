//! Chat session
//!
//! Drives conversation turns on top of the core: records messages, injects
//! retrieved context as hidden system messages, relays the model's response
//! stream and hands the conversation to the background persister.

use std::sync::Arc;

use futures::{pin_mut, Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ledger::{Conversation, Message, PersistQueue, Sender, SharedConversation};
use crate::search::{RetrievalGateway, RetrievedContext};


/// Hidden system prompt that opens every new conversation
pub const SYSTEM_CHAT_PROMPT: &str = "\
You are a programming assistant working in the user's terminal.
Before explaining or changing code, make sure you have seen every file it depends on; \
name any missing files tersely and ask for them.
Restate the user's original goal at the top of each response and keep it stable unless the user changes it.
Never reply with an entire file unless asked. Walk through each change individually, showing the changed code.
Related past conversations, facts and project files may be supplied in hidden system messages; use them when relevant.";

/// One interactive conversation
pub struct ChatSession {
    conversation: SharedConversation,
    gateway: Arc<RetrievalGateway>,
    persister: PersistQueue,
}

impl ChatSession {
    /// Start a fresh conversation seeded with the system prompt
    pub fn new(conversation: Conversation, gateway: Arc<RetrievalGateway>, persister: PersistQueue) -> Self {
        let mut conversation = conversation;
        if conversation.messages().is_empty() {
            conversation.add_message(Message::hidden(Sender::System, SYSTEM_CHAT_PROMPT));
        }
        Self::resume(conversation, gateway, persister)
    }

    /// Continue an existing conversation as is
    pub fn resume(conversation: Conversation, gateway: Arc<RetrievalGateway>, persister: PersistQueue) -> Self {
        Self {
            conversation: Arc::new(Mutex::new(conversation)),
            gateway,
            persister,
        }
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    pub async fn uuid(&self) -> Uuid {
        self.conversation.lock().await.uuid()
    }

    /// Snapshot of every message, hidden ones included, as sent to the model
    pub async fn messages(&self) -> Vec<Message> {
        self.conversation.lock().await.messages().to_vec()
    }

    /// Append a message and queue a save
    pub async fn add_message(&self, message: Message) {
        self.conversation.lock().await.add_message(message);
        self.schedule_save();
    }

    /// Record the user's input and inject related context
    ///
    /// Retrieval failures only mean less context; this never fails.
    pub async fn prepare_turn(&self, input: &str) -> RetrievedContext {
        self.add_message(Message::new(Sender::You, input)).await;

        let context = self.gateway.gather_context(input).await;
        if context.is_empty() {
            debug!("No related context for this turn");
        } else {
            self.add_message(Message::hidden(Sender::System, context.render()))
                .await;
        }
        context
    }

    /// Forward response chunks to `on_chunk` as they arrive, then record the reply
    ///
    /// The save is queued, not awaited. A stream error ends the turn without
    /// recording a reply.
    pub async fn relay_stream<S, E, F>(&self, stream: S, mut on_chunk: F) -> Result<String, E>
    where
        S: Stream<Item = Result<String, E>>,
        F: FnMut(&str),
    {
        pin_mut!(stream);
        let mut reply = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            on_chunk(&chunk);
            reply.push_str(&chunk);
        }

        self.add_message(Message::new(Sender::Assistant, &reply)).await;
        Ok(reply)
    }

    /// Queue a save without waiting on the persister
    fn schedule_save(&self) {
        let conversation = Arc::clone(&self.conversation);
        if self.persister.try_submit(Arc::clone(&conversation)) {
            return;
        }

        let queue = self.persister.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.submit(conversation).await {
                warn!("Conversation save not queued: {}", e);
            }
        });
    }
}
