//! Tests for the workspace

use super::*;
use crate::indexer::IndexerState;
use crate::llm::OfflineModel;
use futures::stream;
use std::fs;
use tempfile::TempDir;

fn offline() -> Arc<dyn LanguageModel> {
    Arc::new(OfflineModel::new(2048))
}

fn git_project(files: &[(&str, &str)]) -> TempDir {
    let project = TempDir::new().expect("Failed to create temp dir");
    fs::create_dir(project.path().join(".git")).unwrap();
    for (name, content) in files {
        fs::write(project.path().join(name), content).unwrap();
    }
    project
}

// ============================================================================
// Unit Tests
// ============================================================================

#[tokio::test]
async fn test_open_without_project() {
    let home = TempDir::new().unwrap();
    let config = AppConfig::new(home.path(), "default").unwrap();

    let workspace = Workspace::open(config, offline()).await.unwrap();

    assert!(workspace.indexer().is_none());
    assert!(!workspace.gateway().has_project());
    assert_eq!(workspace.list_boxes().await.unwrap(), vec!["default"]);
    assert!(workspace.list_projects().await.unwrap().is_empty());
    assert!(home.path().join("vector_store").is_dir());

    workspace.shutdown().await;
}

#[tokio::test]
async fn test_boxes_are_isolated() {
    let home = TempDir::new().unwrap();

    let work = Workspace::open(AppConfig::new(home.path(), "work").unwrap(), offline())
        .await
        .unwrap();
    work.facts().create("work fact").await.unwrap();
    work.shutdown().await;

    let personal = Workspace::open(AppConfig::new(home.path(), "personal").unwrap(), offline())
        .await
        .unwrap();

    assert_eq!(personal.facts().count().await, 0);
    assert_eq!(personal.list_boxes().await.unwrap(), vec!["personal", "work"]);
    personal.shutdown().await;
}

#[tokio::test]
async fn test_project_is_indexed_and_searchable() {
    let home = TempDir::new().unwrap();
    let project = git_project(&[("scheduler.go", "package sched // cron scheduler\n")]);
    let config = AppConfig::new(home.path(), "default")
        .unwrap()
        .with_project(project.path())
        .unwrap();
    let root = config.project.clone().unwrap();

    let mut workspace = Workspace::open(config, offline()).await.unwrap();
    workspace
        .indexer_mut()
        .expect("indexer should start")
        .wait_until_watching()
        .await
        .unwrap();

    assert_eq!(workspace.indexer().unwrap().state(), IndexerState::Watching);
    assert!(workspace.gateway().has_project());

    let results = workspace
        .gateway()
        .search_project_files("cron scheduler", 3)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, root.join("scheduler.go").to_string_lossy());

    assert_eq!(
        workspace.list_projects().await.unwrap(),
        vec![root.to_string_lossy().into_owned()]
    );

    workspace.shutdown().await;
}

#[tokio::test]
async fn test_search_after_waiting_sees_cold_scan() {
    let home = TempDir::new().unwrap();
    let files: Vec<(String, String)> = (0..40)
        .map(|i| (format!("note{:02}.txt", i), format!("filler note number {}\n", i)))
        .chain(std::iter::once(("zebra.txt".to_string(), "striped zebra migration\n".to_string())))
        .collect();
    let borrowed: Vec<(&str, &str)> = files.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();
    let project = git_project(&borrowed);
    let config = AppConfig::new(home.path(), "default")
        .unwrap()
        .with_project(project.path())
        .unwrap();

    let mut workspace = Workspace::open(config, offline()).await.unwrap();
    workspace.wait_for_project_index().await.unwrap();

    assert_eq!(workspace.indexer().unwrap().state(), IndexerState::Watching);
    assert_eq!(workspace.indexer().unwrap().indexer().collection().count().await, 41);
    let results = workspace
        .gateway()
        .search_project_files("striped zebra", 1)
        .await
        .unwrap();
    assert!(results[0].id.ends_with("zebra.txt"));

    workspace.shutdown().await;
}

#[tokio::test]
async fn test_wait_for_project_index_without_project() {
    let home = TempDir::new().unwrap();
    let mut workspace = Workspace::open(AppConfig::new(home.path(), "default").unwrap(), offline())
        .await
        .unwrap();

    workspace.wait_for_project_index().await.unwrap();
    workspace.shutdown().await;
}

#[tokio::test]
async fn test_unversioned_project_leaves_search_empty() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("a.txt"), "text").unwrap();
    let config = AppConfig::new(home.path(), "default")
        .unwrap()
        .with_project(project.path())
        .unwrap();

    let workspace = Workspace::open(config, offline()).await.unwrap();

    assert!(workspace.indexer().is_none());
    let results = workspace.gateway().search_project_files("text", 3).await.unwrap();
    assert!(results.is_empty());

    workspace.shutdown().await;
}

#[tokio::test]
async fn test_indexing_disabled() {
    let home = TempDir::new().unwrap();
    let project = git_project(&[("a.txt", "text")]);
    let mut config = AppConfig::new(home.path(), "default")
        .unwrap()
        .with_project(project.path())
        .unwrap();
    config.settings.indexer.enabled = false;

    let workspace = Workspace::open(config, offline()).await.unwrap();

    assert!(workspace.indexer().is_none());
    workspace.shutdown().await;
}

#[tokio::test]
async fn test_models_with_different_dimensions_use_separate_stores() {
    let home = TempDir::new().unwrap();
    let config = AppConfig::new(home.path(), "default").unwrap();

    let small = Workspace::open(config.clone(), Arc::new(OfflineModel::new(1024)))
        .await
        .unwrap();
    small.facts().create("stored with small vectors").await.unwrap();
    small.shutdown().await;

    let large = Workspace::open(config.clone(), Arc::new(OfflineModel::new(1536)))
        .await
        .unwrap();
    assert_eq!(large.facts().count().await, 0);
    large.facts().create("stored with large vectors").await.unwrap();
    let results = large.gateway().search_facts("large vectors", 3).await.unwrap();
    assert_eq!(results.len(), 1);
    large.shutdown().await;

    assert!(home.path().join("vector_store").join("offline-1024").is_dir());
    assert!(home.path().join("vector_store").join("offline-1536").is_dir());

    let reopened = Workspace::open(config, Arc::new(OfflineModel::new(1024)))
        .await
        .unwrap();
    let results = reopened.gateway().search_facts("small vectors", 3).await.unwrap();
    assert_eq!(results[0].content, "stored with small vectors");
    reopened.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_keeps_final_save() {
    let home = TempDir::new().unwrap();
    let config = AppConfig::new(home.path(), "default").unwrap();
    let workspace = Workspace::open(config.clone(), offline()).await.unwrap();

    let session = workspace.new_session();
    session.prepare_turn("what is a box?").await;
    session
        .relay_stream(
            stream::iter(vec![Ok::<_, std::io::Error>("an isolated workspace".to_string())]),
            |_| {},
        )
        .await
        .unwrap();
    let uuid = session.uuid().await;
    workspace.shutdown().await;

    let reopened = Workspace::open(config, offline()).await.unwrap();
    let loaded = reopened.ledger().load_conversation(uuid).await.unwrap();
    assert_eq!(loaded.messages().last().unwrap().content, "an isolated workspace");
    assert!(!loaded.summary().is_empty());

    let related = reopened
        .gateway()
        .search_conversations("isolated workspace", 1)
        .await
        .unwrap();
    assert_eq!(related[0].id, uuid.to_string());
    reopened.shutdown().await;
}
