//! Tests for the retrieval module

use super::*;
use crate::facts::FactStore;
use crate::llm::testing::{CountingModel, FailingModel};
use crate::llm::{LanguageModel, LlmResult, OfflineModel};
use crate::vector::{metadata_keys, names, Collection, Document, EmbeddingStore, ScoredDocument};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Offline model whose embeddings take a while
struct SlowModel {
    inner: OfflineModel,
    delay: Duration,
}

#[async_trait]
impl LanguageModel for SlowModel {
    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(text).await
    }

    async fn quick_complete(&self, system: &str, user: &str) -> LlmResult<String> {
        self.inner.quick_complete(system, user).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "slow"
    }
}

struct Fixture {
    conversations: Arc<Collection>,
    facts: Arc<Collection>,
    project: Arc<Collection>,
    _temp_dir: TempDir,
}

fn offline() -> Arc<dyn LanguageModel> {
    Arc::new(OfflineModel::new(2048))
}

/// Store with one conversation, two facts and two project files
async fn populated() -> Fixture {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = EmbeddingStore::open(temp_dir.path().join("vector_store"), offline())
        .await
        .expect("Failed to open store");

    let conversations = store
        .open_or_create_collection(&names::conversations("default"))
        .await
        .unwrap();
    let facts = store.open_or_create_collection(&names::facts("default")).await.unwrap();
    let project = store
        .open_or_create_collection(&names::project_files(temp_dir.path()))
        .await
        .unwrap();

    conversations
        .upsert(
            vec![Document::new("c1", "debugging the tokio runtime shutdown")
                .with_metadata(metadata_keys::CREATED, "2024-01-01T10:00:00Z")
                .with_metadata(metadata_keys::UPDATED, "2024-01-01T11:00:00Z")],
            1,
        )
        .await
        .unwrap();
    facts
        .upsert(
            vec![
                Document::new("f1", "tokio runtime is multi threaded")
                    .with_metadata(metadata_keys::CREATED, "2024-01-02T00:00:00Z")
                    .with_metadata(metadata_keys::UPDATED, "2024-01-02T00:00:00Z"),
                Document::new("f2", "the garden needs watering"),
            ],
            1,
        )
        .await
        .unwrap();
    project
        .upsert(
            vec![
                Document::new("/repo/src/runtime.rs", "fn build_tokio_runtime() {}"),
                Document::new("/repo/README.md", "gardening notes"),
            ],
            2,
        )
        .await
        .unwrap();

    Fixture {
        conversations,
        facts,
        project,
        _temp_dir: temp_dir,
    }
}

fn gateway(fixture: &Fixture, llm: Arc<dyn LanguageModel>, with_project: bool, config: SearchConfig) -> RetrievalGateway {
    let facts = Arc::new(FactStore::new(fixture.facts.clone(), llm.clone()).with_search_timeout(config.timeout));
    RetrievalGateway::new(
        llm,
        fixture.conversations.clone(),
        facts,
        with_project.then(|| fixture.project.clone()),
        config,
    )
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn test_search_config_from_settings() {
    let settings = crate::core::config::SearchSettings::default();
    let config = SearchConfig::from(&settings);
    assert_eq!(config.timeout, Some(Duration::from_millis(settings.timeout_ms)));
    assert_eq!(config.results_per_source, settings.results_per_source);

    let disabled = crate::core::config::SearchSettings {
        timeout_ms: 0,
        ..settings
    };
    assert_eq!(SearchConfig::from(&disabled).timeout, None);
}

#[test]
fn test_result_from_scored_document() {
    let scored = ScoredDocument {
        document: Document::new("id", "body")
            .with_metadata(metadata_keys::CREATED, "a")
            .with_metadata(metadata_keys::UPDATED, "b"),
        score: 0.5,
    };
    let result = SearchResult::from(scored);
    assert_eq!(result.id, "id");
    assert_eq!(result.content, "body");
    assert_eq!(result.created, "a");
    assert_eq!(result.updated, "b");
    assert_eq!(result.score, 0.5);
}

#[test]
fn test_result_renderings() {
    let result = SearchResult {
        id: "42".to_string(),
        content: "body".to_string(),
        created: "2024-01-01".to_string(),
        updated: "2024-01-02".to_string(),
        score: 1.0,
    };

    assert_eq!(
        result.conversation_string(),
        "Conversation from 2024-01-01 to 2024-01-02:\nbody\n\n"
    );
    assert_eq!(
        result.fact_string(),
        "Fact with ID `42` created on 2024-01-01, last updated on 2024-01-02:\nbody\n\n"
    );
    assert_eq!(result.project_file_string(), "Project file: 42\nbody\n\n");

    let same_day = SearchResult {
        updated: result.created.clone(),
        ..result
    };
    assert_eq!(same_day.conversation_string(), "Conversation on 2024-01-01:\nbody\n\n");
}

#[tokio::test]
async fn test_embed_and_query_ranks_by_similarity() {
    let fixture = populated().await;
    let llm = OfflineModel::new(2048);

    let results = embed_and_query(&llm, &fixture.project, "tokio runtime", 2, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "/repo/src/runtime.rs");
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn test_embed_and_query_skips_model_when_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = EmbeddingStore::open(temp_dir.path(), offline()).await.unwrap();
    let empty = store.open_or_create_collection("empty").await.unwrap();
    let llm = CountingModel::default();

    let results = embed_and_query(&llm, &empty, "anything", 5, None).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(llm.embed_calls(), 0);
}

#[tokio::test]
async fn test_embed_and_query_zero_k() {
    let fixture = populated().await;
    let llm = CountingModel::default();

    let results = embed_and_query(&llm, &fixture.facts, "anything", 0, None).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(llm.embed_calls(), 0);
}

#[tokio::test]
async fn test_embed_and_query_embedding_unavailable() {
    let fixture = populated().await;

    let err = embed_and_query(&FailingModel, &fixture.facts, "anything", 1, None)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::EmbeddingUnavailable { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_embed_and_query_timeout() {
    let fixture = populated().await;
    let slow = SlowModel {
        inner: OfflineModel::new(2048),
        delay: Duration::from_millis(500),
    };

    let err = embed_and_query(&slow, &fixture.facts, "anything", 1, Some(Duration::from_millis(20)))
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::Timeout { timeout_ms: 20 }));
}

#[tokio::test]
async fn test_distill_query_uses_model_output() {
    let llm = OfflineModel::default();
    let query = distill_query(&llm, "  what did we   decide about the runtime?  ").await;
    assert_eq!(query, "what did we decide about the runtime?");
}

#[tokio::test]
async fn test_distill_query_falls_back_to_input() {
    let query = distill_query(&FailingModel, "raw input").await;
    assert_eq!(query, "raw input");
}

#[tokio::test]
async fn test_project_search_without_project_is_empty() {
    let fixture = populated().await;
    let gateway = gateway(&fixture, offline(), false, SearchConfig::default());

    assert!(!gateway.has_project());
    let results = gateway.search_project_files("tokio", 5).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_gateway_searches_each_collection() {
    let fixture = populated().await;
    let gateway = gateway(&fixture, offline(), true, SearchConfig::default());

    let conversations = gateway.search_conversations("tokio runtime", 5).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].id, "c1");

    let facts = gateway.search_facts("tokio runtime", 1).await.unwrap();
    assert_eq!(facts[0].id, "f1");

    let files = gateway.search_project_files("tokio runtime", 1).await.unwrap();
    assert_eq!(files[0].id, "/repo/src/runtime.rs");
}

#[tokio::test]
async fn test_gather_context_renders_all_sources() {
    let fixture = populated().await;
    let config = SearchConfig::default().with_results_per_source(1);
    let gateway = gateway(&fixture, offline(), true, config);

    let context = gateway.gather_context("tokio runtime").await;

    assert!(!context.is_empty());
    assert_eq!(context.conversations.len(), 1);
    assert_eq!(context.facts.len(), 1);
    assert_eq!(context.project_files.len(), 1);

    let rendered = context.render();
    assert!(rendered.contains("Conversation from 2024-01-01T10:00:00Z to 2024-01-01T11:00:00Z:"));
    assert!(rendered.contains("Fact with ID `f1`"));
    assert!(rendered.contains("Project file: /repo/src/runtime.rs"));
}

#[tokio::test]
async fn test_gather_context_never_fails() {
    let fixture = populated().await;
    let gateway = gateway(&fixture, Arc::new(FailingModel), true, SearchConfig::default());

    let context = gateway.gather_context("tokio runtime").await;

    assert!(context.is_empty());
    assert_eq!(context.query, "tokio runtime");
    assert!(context.render().is_empty());
}

#[tokio::test]
async fn test_gather_context_without_distillation() {
    let fixture = populated().await;
    let llm = Arc::new(CountingModel::default());
    let config = SearchConfig::default().with_distillation(false);
    let gateway = gateway(&fixture, llm.clone(), false, config);

    let context = gateway.gather_context("tokio runtime").await;

    assert_eq!(context.query, "tokio runtime");
    assert_eq!(llm.completion_calls(), 0);
    // conversations and facts; no project
    assert_eq!(llm.embed_calls(), 2);
}
