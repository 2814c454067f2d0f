//! Workspace
//!
//! The per-process owner of every store for the active box. Built once from
//! [`AppConfig`] and passed by reference to whatever needs it.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::facts::FactStore;
use crate::indexer::{IndexerHandle, ProjectIndexer};
use crate::ledger::{ConversationLedger, ConversationPersister, PersistQueue, PersisterHandle};
use crate::llm::LanguageModel;
use crate::search::{RetrievalGateway, SearchConfig};
use crate::session::ChatSession;
use crate::vector::{names, Collection, EmbeddingStore};

#[cfg(test)]
mod tests;

/// Stores, background workers and retrieval for one box
pub struct Workspace {
    config: AppConfig,
    llm: Arc<dyn LanguageModel>,
    store: Arc<EmbeddingStore>,
    facts: Arc<FactStore>,
    ledger: Arc<ConversationLedger>,
    gateway: Arc<RetrievalGateway>,
    persister: PersisterHandle,
    indexer: Option<IndexerHandle>,
}

impl Workspace {
    /// Open the box described by `config`
    ///
    /// Store failures are fatal. A project that cannot be indexed is logged
    /// and leaves project search empty.
    pub async fn open(config: AppConfig, llm: Arc<dyn LanguageModel>) -> Result<Self> {
        let space = llm.embedding_space();
        info!(
            "Opening workspace (home: {:?}, box: {}, embedding space: {})",
            config.home, config.box_name, space
        );

        let store = Arc::new(EmbeddingStore::open(config.embedding_store_path(&space), Arc::clone(&llm)).await?);

        let conversations = store
            .open_or_create_collection(&names::conversations(&config.box_name))
            .await?;
        let facts_collection = store
            .open_or_create_collection(&names::facts(&config.box_name))
            .await?;

        let search_config = SearchConfig::from(&config.settings.search);
        let facts = Arc::new(
            FactStore::new(facts_collection, Arc::clone(&llm)).with_search_timeout(search_config.timeout),
        );

        let ledger = Arc::new(
            ConversationLedger::new(config.conversations_dir()).with_collection(Arc::clone(&conversations)),
        );
        let persister = ConversationPersister::new(Arc::clone(&ledger), Arc::clone(&llm))
            .spawn(config.settings.persister.queue_depth);

        let indexer = Self::start_indexer(&config, &store).await;
        let project_files = indexer.as_ref().map(|h| Arc::clone(h.indexer().collection()));

        let gateway = Arc::new(RetrievalGateway::new(
            Arc::clone(&llm),
            conversations,
            Arc::clone(&facts),
            project_files,
            search_config,
        ));

        Ok(Self {
            config,
            llm,
            store,
            facts,
            ledger,
            gateway,
            persister,
            indexer,
        })
    }

    async fn start_indexer(config: &AppConfig, store: &EmbeddingStore) -> Option<IndexerHandle> {
        let project = config.project.as_ref()?;
        if !config.settings.indexer.enabled {
            info!("Project indexing disabled; not indexing {:?}", project);
            return None;
        }

        let collection: Arc<Collection> = match store.open_or_create_collection(&names::project_files(project)).await {
            Ok(collection) => collection,
            Err(e) => {
                warn!("Project index unavailable for {:?}: {}", project, e);
                return None;
            }
        };

        let indexer = match ProjectIndexer::new(project, collection, config.settings.indexer.clone()) {
            Ok(indexer) => Arc::new(indexer),
            Err(e) => {
                error!("Cannot index project {:?}: {}", project, e);
                return None;
            }
        };

        match indexer.start() {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to start watching {:?}: {}", project, e);
                None
            }
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    pub fn facts(&self) -> &Arc<FactStore> {
        &self.facts
    }

    pub fn ledger(&self) -> &Arc<ConversationLedger> {
        &self.ledger
    }

    pub fn gateway(&self) -> &Arc<RetrievalGateway> {
        &self.gateway
    }

    /// Running project indexer, if a project is being indexed
    pub fn indexer(&self) -> Option<&IndexerHandle> {
        self.indexer.as_ref()
    }

    pub fn indexer_mut(&mut self) -> Option<&mut IndexerHandle> {
        self.indexer.as_mut()
    }

    /// Wait until the initial project scan has finished; immediate without a project
    pub async fn wait_for_project_index(&mut self) -> Result<()> {
        if let Some(indexer) = self.indexer.as_mut() {
            indexer.wait_until_watching().await?;
        }
        Ok(())
    }

    pub fn persist_queue(&self) -> PersistQueue {
        self.persister.queue()
    }

    /// Start a new chat session in this box
    pub fn new_session(&self) -> ChatSession {
        ChatSession::new(
            self.ledger.new_conversation(),
            Arc::clone(&self.gateway),
            self.persister.queue(),
        )
    }

    /// Boxes that have a conversations collection
    pub async fn list_boxes(&self) -> Result<Vec<String>> {
        Ok(self.store.list_boxes().await?)
    }

    /// Project roots that have ever been indexed
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        Ok(self.store.list_projects().await?)
    }

    /// Stop the indexer and finish pending saves
    pub async fn shutdown(self) {
        if let Some(indexer) = &self.indexer {
            indexer.abort();
        }
        self.persister.shutdown().await;
        info!("Workspace for box {} closed", self.config.box_name);
    }
}
