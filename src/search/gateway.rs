//! Retrieval gateway
//!
//! Query-by-text over the conversations, facts and project files of the
//! active box. Text is embedded through the language model before the
//! matching collection is queried.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::SearchOutcome;
use super::query::{distill_query, embed_and_query};
use super::result::SearchResult;
use crate::core::config::SearchSettings;
use crate::facts::FactStore;
use crate::llm::LanguageModel;
use crate::vector::Collection;

/// Retrieval configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Bound on each search; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Distill chat input into a short query before searching
    pub distill_queries: bool,
    /// Results per collection when gathering context
    pub results_per_source: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::from(&SearchSettings::default())
    }
}

impl From<&SearchSettings> for SearchConfig {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            timeout: (settings.timeout_ms > 0).then(|| Duration::from_millis(settings.timeout_ms)),
            distill_queries: settings.distill_queries,
            results_per_source: settings.results_per_source,
        }
    }
}

impl SearchConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_distillation(mut self, enabled: bool) -> Self {
        self.distill_queries = enabled;
        self
    }

    pub fn with_results_per_source(mut self, k: usize) -> Self {
        self.results_per_source = k;
        self
    }
}

/// Context retrieved for one chat turn
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub query: String,
    pub conversations: Vec<SearchResult>,
    pub facts: Vec<SearchResult>,
    pub project_files: Vec<SearchResult>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty() && self.facts.is_empty() && self.project_files.is_empty()
    }

    /// Prompt text for injection as a hidden system message
    pub fn render(&self) -> String {
        let mut buf = String::new();

        if !self.conversations.is_empty() {
            buf.push_str("Summaries of related past conversations:\n\n");
            for result in &self.conversations {
                buf.push_str(&result.conversation_string());
            }
        }

        if !self.facts.is_empty() {
            buf.push_str("Relevant facts from long-term memory:\n\n");
            for result in &self.facts {
                buf.push_str(&result.fact_string());
            }
        }

        if !self.project_files.is_empty() {
            buf.push_str("Relevant files from the current project:\n\n");
            for result in &self.project_files {
                buf.push_str(&result.project_file_string());
            }
        }

        buf
    }
}

/// Unified query-by-text over the box's collections
pub struct RetrievalGateway {
    llm: Arc<dyn LanguageModel>,
    conversations: Arc<Collection>,
    facts: Arc<FactStore>,
    project_files: Option<Arc<Collection>>,
    config: SearchConfig,
}

impl RetrievalGateway {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        conversations: Arc<Collection>,
        facts: Arc<FactStore>,
        project_files: Option<Arc<Collection>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            llm,
            conversations,
            facts,
            project_files,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Whether a project is indexed
    pub fn has_project(&self) -> bool {
        self.project_files.is_some()
    }

    /// Past conversations ranked by summary similarity
    pub async fn search_conversations(&self, text: &str, k: usize) -> SearchOutcome<Vec<SearchResult>> {
        embed_and_query(self.llm.as_ref(), &self.conversations, text, k, self.config.timeout).await
    }

    /// Facts ranked by similarity
    pub async fn search_facts(&self, text: &str, k: usize) -> SearchOutcome<Vec<SearchResult>> {
        self.facts.search(text, k).await
    }

    /// Project files ranked by similarity; empty without a project
    pub async fn search_project_files(&self, text: &str, k: usize) -> SearchOutcome<Vec<SearchResult>> {
        match &self.project_files {
            Some(collection) => {
                embed_and_query(self.llm.as_ref(), collection, text, k, self.config.timeout).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Gather context for a chat turn; never fails
    ///
    /// Each source that fails is logged and contributes nothing.
    pub async fn gather_context(&self, input: &str) -> RetrievedContext {
        let query = if self.config.distill_queries {
            distill_query(self.llm.as_ref(), input).await
        } else {
            input.to_string()
        };
        let k = self.config.results_per_source;

        let (conversations, facts, project_files) = tokio::join!(
            self.search_conversations(&query, k),
            self.search_facts(&query, k),
            self.search_project_files(&query, k),
        );

        let context = RetrievedContext {
            conversations: or_empty("conversations", conversations),
            facts: or_empty("facts", facts),
            project_files: or_empty("project files", project_files),
            query,
        };

        debug!(
            "Gathered context: {} conversations, {} facts, {} project files",
            context.conversations.len(),
            context.facts.len(),
            context.project_files.len()
        );

        context
    }
}

fn or_empty(source: &str, outcome: SearchOutcome<Vec<SearchResult>>) -> Vec<SearchResult> {
    outcome.unwrap_or_else(|e| {
        warn!("Search of {} failed, continuing without it: {}", source, e);
        Vec::new()
    })
}
