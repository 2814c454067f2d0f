//! Background conversation persistence
//!
//! Save requests go through a bounded queue drained by a single worker, so
//! saves never interleave and never block the chat stream. The worker
//! refreshes the summary after assistant replies, saves, then publishes.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::conversation::Conversation;
use super::error::{LedgerError, LedgerResult};
use super::store::ConversationLedger;
use crate::llm::{LanguageModel, LlmResult};

/// A conversation shared between the chat session and the persister
pub type SharedConversation = Arc<Mutex<Conversation>>;

/// System prompt used to summarize a conversation
pub const SUMMARY_PROMPT: &str = "\
Your job is to summarize a conversation.
It is essential that you identify all significant facts in the conversation transcript.
Assemble a nested outline of this conversation in markdown format.
If there is file content present, include the file path and an individual summary of the file content as a distinct set of nested list items.
If there is command output, include the command and the relevance of its output, then very tersely summarize how it relates to the conversation.
If a problem was solved in the conversation, include the details of the problem and solution, as well as the steps taken to troubleshoot.
Respond ONLY with a summary of the discussion, followed by your outline of ALL facts identified in the conversation.";

enum Job {
    Persist(SharedConversation),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Refreshes, saves and publishes conversations
pub struct ConversationPersister {
    ledger: Arc<ConversationLedger>,
    llm: Arc<dyn LanguageModel>,
}

impl ConversationPersister {
    pub fn new(ledger: Arc<ConversationLedger>, llm: Arc<dyn LanguageModel>) -> Self {
        Self { ledger, llm }
    }

    /// Start the worker task with a queue of `queue_depth` pending jobs
    pub fn spawn(self, queue_depth: usize) -> PersisterHandle {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_depth.max(1));

        let task = tokio::spawn(async move {
            info!("Conversation persister started");
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Persist(conversation) => self.persist(&conversation).await,
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                    Job::Shutdown => break,
                }
            }
            info!("Conversation persister stopped");
        });

        PersisterHandle {
            queue: PersistQueue { tx },
            task,
        }
    }

    /// Refresh the summary if due, then save and publish
    pub async fn persist(&self, conversation: &SharedConversation) {
        let mut snapshot = conversation.lock().await.clone();

        if snapshot.awaiting_user() {
            match self.summarize(&snapshot).await {
                Ok((summary, embedding)) => {
                    let mut live = conversation.lock().await;
                    live.set_summary(summary, embedding);
                    snapshot = live.clone();
                }
                Err(e) => warn!(
                    conversation = %snapshot.uuid(),
                    "Failed to refresh conversation summary: {}",
                    e
                ),
            }
        }

        self.ledger.save(&snapshot).await;

        match self.ledger.publish(&snapshot).await {
            Ok(true) => {}
            Ok(false) => debug!("Conversation {} has no summary to publish", snapshot.uuid()),
            Err(e) => warn!(
                conversation = %snapshot.uuid(),
                "Failed to publish conversation summary: {}",
                e
            ),
        }
    }

    async fn summarize(&self, conversation: &Conversation) -> LlmResult<(String, Vec<f32>)> {
        let summary = self
            .llm
            .quick_complete(SUMMARY_PROMPT, &conversation.chat_transcript())
            .await?;
        let embedding = self.llm.embed(&summary).await?;
        Ok((summary, embedding))
    }
}

/// Cloneable submission side of the persister queue
#[derive(Clone)]
pub struct PersistQueue {
    tx: mpsc::Sender<Job>,
}

impl PersistQueue {
    /// Queue a conversation for saving; waits only while the queue is full
    pub async fn submit(&self, conversation: SharedConversation) -> LedgerResult<()> {
        self.tx
            .send(Job::Persist(conversation))
            .await
            .map_err(|_| LedgerError::PersisterClosed)
    }

    /// Queue a conversation without waiting; false when the queue is full or closed
    pub fn try_submit(&self, conversation: SharedConversation) -> bool {
        self.tx.try_send(Job::Persist(conversation)).is_ok()
    }

    /// Wait until every job submitted before this call has finished
    pub async fn flush(&self) -> LedgerResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Job::Flush(done_tx))
            .await
            .map_err(|_| LedgerError::PersisterClosed)?;
        done_rx.await.map_err(|_| LedgerError::PersisterClosed)
    }
}

/// Owner of the persister worker
pub struct PersisterHandle {
    queue: PersistQueue,
    task: JoinHandle<()>,
}

impl PersisterHandle {
    /// A submission handle for sessions
    pub fn queue(&self) -> PersistQueue {
        self.queue.clone()
    }

    /// Finish queued jobs, then stop the worker
    pub async fn shutdown(self) {
        if self.queue.tx.send(Job::Shutdown).await.is_err() {
            debug!("Conversation persister already stopped");
        }
        if let Err(e) = self.task.await {
            warn!("Conversation persister task failed: {}", e);
        }
    }
}
