//! Tests for the project indexer

use super::*;
use crate::llm::testing::{CountingModel, PoisonedModel};
use crate::llm::{LanguageModel, OfflineModel};
use crate::search::embed_and_query;
use crate::vector::{names, EmbeddingStore};
use crate::watcher::WatcherError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

const PNG_HEAD: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// In-memory watch set
#[derive(Default)]
struct FakeRegistry {
    watched: Mutex<HashSet<PathBuf>>,
}

impl WatchRegistry for FakeRegistry {
    fn watch(&self, dir: &Path) -> Result<(), WatcherError> {
        self.watched.lock().insert(dir.to_path_buf());
        Ok(())
    }

    fn unwatch(&self, dir: &Path) {
        self.watched.lock().remove(dir);
    }

    fn is_watched(&self, dir: &Path) -> bool {
        self.watched.lock().contains(dir)
    }

    fn watched_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.watched.lock().iter().filter(|p| p.starts_with(dir)).cloned().collect()
    }
}

/// A version controlled project with the given files
fn project(files: &[(&str, &[u8])]) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
    for (name, content) in files {
        write(temp_dir.path(), name, content);
    }
    temp_dir
}

fn write(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

struct Fixture {
    indexer: Arc<ProjectIndexer>,
    _store_dir: TempDir,
}

async fn indexer_for(project: &TempDir, llm: Arc<dyn LanguageModel>) -> Fixture {
    let store_dir = TempDir::new().unwrap();
    let store = EmbeddingStore::open(store_dir.path(), llm).await.unwrap();
    let root = fs::canonicalize(project.path()).unwrap();
    let collection = store
        .open_or_create_collection(&names::project_files(&root))
        .await
        .unwrap();
    let indexer = ProjectIndexer::new(&root, collection, IndexerSettings::default()).unwrap();
    Fixture {
        indexer: Arc::new(indexer),
        _store_dir: store_dir,
    }
}

async fn offline_indexer(project: &TempDir) -> Fixture {
    indexer_for(project, Arc::new(OfflineModel::new(2048))).await
}

fn id(indexer: &ProjectIndexer, name: &str) -> String {
    indexer.root().join(name).to_string_lossy().into_owned()
}

async fn indexed_names(indexer: &ProjectIndexer) -> Vec<String> {
    let prefix = format!("{}{}", indexer.root().to_string_lossy(), std::path::MAIN_SEPARATOR);
    indexer
        .collection()
        .ids()
        .await
        .into_iter()
        .map(|id| id.trim_start_matches(&prefix).to_string())
        .collect()
}

// ============================================================================
// Preconditions
// ============================================================================

#[tokio::test]
async fn test_requires_version_control() {
    let temp_dir = TempDir::new().unwrap();
    let store = EmbeddingStore::open(temp_dir.path().join("vs"), Arc::new(OfflineModel::new(8)))
        .await
        .unwrap();
    let collection = store.open_or_create_collection("project_files:x").await.unwrap();
    let root = temp_dir.path().join("plain");
    fs::create_dir(&root).unwrap();

    let err = ProjectIndexer::new(&root, collection, IndexerSettings::default()).unwrap_err();

    assert!(matches!(err, IndexError::NotVersionControlled { .. }));
    assert!(err.is_precondition());
}

#[tokio::test]
async fn test_malformed_gitignore_is_fatal() {
    let project = project(&[(".gitignore", b"src/[\n")]);
    let temp_dir = TempDir::new().unwrap();
    let store = EmbeddingStore::open(temp_dir.path(), Arc::new(OfflineModel::new(8)))
        .await
        .unwrap();
    let collection = store.open_or_create_collection("project_files:x").await.unwrap();

    let err = ProjectIndexer::new(project.path(), collection, IndexerSettings::default()).unwrap_err();

    assert!(matches!(err, IndexError::IgnoreFile { .. }));
    assert!(err.is_precondition());
}

#[tokio::test]
async fn test_missing_root_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let store = EmbeddingStore::open(temp_dir.path(), Arc::new(OfflineModel::new(8)))
        .await
        .unwrap();
    let collection = store.open_or_create_collection("project_files:x").await.unwrap();

    let err = ProjectIndexer::new(temp_dir.path().join("missing"), collection, IndexerSettings::default())
        .unwrap_err();

    assert!(matches!(err, IndexError::Io { .. }));
    assert!(!err.is_precondition());
}

#[tokio::test]
async fn test_missing_gitignore_is_fine() {
    let project = project(&[("main.go", b"package main\n")]);
    let fixture = offline_indexer(&project).await;

    assert_eq!(fixture.indexer.state(), IndexerState::Uninitialized);
    assert!(fixture.indexer.filter().rules().is_empty());
}

// ============================================================================
// Bulk indexing
// ============================================================================

#[tokio::test]
async fn test_bulk_index_eligibility() {
    let project = project(&[
        (".gitignore", b"secret.txt\nbuild/\n"),
        ("main.go", b"package main\n\nfunc main() {}\n"),
        ("notes.txt", b"remember the milk\n"),
        ("secret.txt", b"hunter2\n"),
        ("build/output.txt", b"artifact\n"),
        ("assets/logo.png", &PNG_HEAD),
        ("assets/fake.txt", &PNG_HEAD),
        ("src/lib.rs", b"pub fn answer() -> u32 { 42 }\n"),
        (".git/config", b"[core]\n"),
    ]);
    let fixture = offline_indexer(&project).await;

    let report = fixture.indexer.bulk_index().await;

    assert_eq!(
        indexed_names(&fixture.indexer).await,
        vec![".gitignore", "main.go", "notes.txt", "src/lib.rs"]
    );
    assert_eq!(report.eligible, 4);
    assert_eq!(report.indexed, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(fixture.indexer.state(), IndexerState::BulkIndexing);
}

#[tokio::test]
async fn test_document_keyed_by_path() {
    let project = project(&[("main.go", b"package main\n")]);
    let fixture = offline_indexer(&project).await;

    fixture.indexer.bulk_index().await;

    let main = id(&fixture.indexer, "main.go");
    let doc = fixture.indexer.collection().get_by_id(&main).await.unwrap();
    assert_eq!(doc.content, "package main\n");
    assert_eq!(doc.meta(metadata_keys::HASH), Some(main.as_str()));
    assert_eq!(
        doc.meta(metadata_keys::DIGEST),
        Some(hash_content(b"package main\n").as_str())
    );
}

#[tokio::test]
async fn test_bulk_index_skips_unchanged_files() {
    let project = project(&[("a.txt", b"alpha\n"), ("b.txt", b"beta\n")]);
    let llm = Arc::new(CountingModel::default());
    let fixture = indexer_for(&project, llm.clone()).await;

    fixture.indexer.bulk_index().await;
    assert_eq!(llm.embed_calls(), 2);

    write(project.path(), "b.txt", b"beta, revised\n");
    let report = fixture.indexer.bulk_index().await;

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.indexed, 1);
    assert_eq!(llm.embed_calls(), 3);
    assert_eq!(fixture.indexer.collection().count().await, 2);

    let stats = fixture.indexer.stats();
    assert_eq!(stats.total_indexed, 3);
    assert_eq!(stats.total_unchanged, 1);
}

#[tokio::test]
async fn test_bulk_index_falls_back_per_file() {
    let project = project(&[
        ("good.txt", b"fine content\n"),
        ("bad.txt", b"this one is poison\n"),
        ("other.txt", b"more fine content\n"),
    ]);
    let fixture = indexer_for(&project, Arc::new(PoisonedModel::new("poison"))).await;

    let report = fixture.indexer.bulk_index().await;

    assert_eq!(report.indexed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(indexed_names(&fixture.indexer).await, vec!["good.txt", "other.txt"]);
    assert_eq!(fixture.indexer.stats().total_failed, 1);
}

#[tokio::test]
async fn test_bulk_index_prunes_files_deleted_while_stopped() {
    let project = project(&[("keep.txt", b"kept\n"), ("gone.txt", b"deleted later\n"), ("pic.txt", b"text for now\n")]);
    let fixture = offline_indexer(&project).await;
    fixture.indexer.bulk_index().await;
    assert_eq!(fixture.indexer.collection().count().await, 3);

    fs::remove_file(project.path().join("gone.txt")).unwrap();
    write(project.path(), "pic.txt", &PNG_HEAD);
    let report = fixture.indexer.bulk_index().await;

    assert_eq!(report.removed, 2);
    assert_eq!(report.unchanged, 1);
    assert_eq!(indexed_names(&fixture.indexer).await, vec!["keep.txt"]);
    assert_eq!(fixture.indexer.stats().total_removed, 2);
}

#[tokio::test]
async fn test_add_watches_recursive() {
    let project = project(&[
        (".gitignore", b"target/\n"),
        ("src/a/mod.rs", b"\n"),
        ("target/debug/out", b"\n"),
        (".git/objects/xx", b"\n"),
    ]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    let root = fixture.indexer.root().to_path_buf();

    let added = fixture.indexer.add_watches_recursive(&root, &registry);

    assert_eq!(added, 3);
    assert!(registry.is_watched(&root));
    assert!(registry.is_watched(&root.join("src")));
    assert!(registry.is_watched(&root.join("src/a")));
    assert!(!registry.is_watched(&root.join("target")));
    assert!(!registry.is_watched(&root.join(".git")));

    assert_eq!(fixture.indexer.add_watches_recursive(&root, &registry), 0);
}

// ============================================================================
// Incremental updates
// ============================================================================

#[tokio::test]
async fn test_created_file_becomes_searchable_then_disappears() {
    let project = project(&[("README.md", b"gardening notes\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    let llm = OfflineModel::new(2048);
    fixture.indexer.bulk_index().await;

    write(project.path(), "runtime.go", b"tokio runtime scheduler notes\n");
    let path = fixture.indexer.root().join("runtime.go");
    fixture
        .indexer
        .handle_event(FileEvent::Created(path.clone()), &registry)
        .await;

    let results = embed_and_query(&llm, fixture.indexer.collection(), "runtime scheduler", 1, None)
        .await
        .unwrap();
    assert_eq!(results[0].id, id(&fixture.indexer, "runtime.go"));

    fs::remove_file(&path).unwrap();
    fixture.indexer.handle_event(FileEvent::Removed(path), &registry).await;

    let results = embed_and_query(&llm, fixture.indexer.collection(), "runtime scheduler", 5, None)
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.id != id(&fixture.indexer, "runtime.go")));
    assert_eq!(fixture.indexer.stats().total_removed, 1);
}

#[tokio::test]
async fn test_modified_file_is_reindexed() {
    let project = project(&[("notes.txt", b"first draft\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    fixture.indexer.bulk_index().await;

    write(project.path(), "notes.txt", b"second draft\n");
    let path = fixture.indexer.root().join("notes.txt");
    fixture.indexer.handle_event(FileEvent::Modified(path), &registry).await;

    let doc = fixture
        .indexer
        .collection()
        .get_by_id(&id(&fixture.indexer, "notes.txt"))
        .await
        .unwrap();
    assert_eq!(doc.content, "second draft\n");
}

#[tokio::test]
async fn test_ineligible_events_are_ignored() {
    let project = project(&[(".gitignore", b"*.log\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();

    write(project.path(), "debug.log", b"noise\n");
    write(project.path(), "photo.png", &PNG_HEAD);
    write(project.path(), ".git/index", b"binary-ish\n");
    let root = fixture.indexer.root().to_path_buf();

    for name in ["debug.log", "photo.png", ".git/index"] {
        fixture
            .indexer
            .handle_event(FileEvent::Created(root.join(name)), &registry)
            .await;
    }

    assert_eq!(fixture.indexer.collection().count().await, 0);
}

#[tokio::test]
async fn test_removed_event_for_existing_file_drops_it() {
    let project = project(&[("stale.txt", b"still on disk\n"), ("other.txt", b"other\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    fixture.indexer.bulk_index().await;

    let path = fixture.indexer.root().join("stale.txt");
    fixture.indexer.handle_event(FileEvent::Removed(path), &registry).await;

    assert_eq!(indexed_names(&fixture.indexer).await, vec!["other.txt"]);
}

#[tokio::test]
async fn test_removed_event_for_existing_directory_detaches_watch() {
    let project = project(&[("lib/a.txt", b"a\n"), ("lib/inner/b.txt", b"b\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    let root = fixture.indexer.root().to_path_buf();
    fixture.indexer.add_watches_recursive(&root, &registry);
    fixture.indexer.bulk_index().await;

    fixture
        .indexer
        .handle_event(FileEvent::Removed(root.join("lib")), &registry)
        .await;

    assert!(!registry.is_watched(&root.join("lib")));
    assert!(!registry.is_watched(&root.join("lib/inner")));
    assert!(registry.is_watched(&root));
    assert_eq!(fixture.indexer.collection().count().await, 2);
}

#[tokio::test]
async fn test_file_that_becomes_binary_is_dropped() {
    let project = project(&[("image.txt", b"plain text for now\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    fixture.indexer.bulk_index().await;

    write(project.path(), "image.txt", &PNG_HEAD);
    let path = fixture.indexer.root().join("image.txt");
    fixture.indexer.handle_event(FileEvent::Modified(path), &registry).await;

    assert_eq!(fixture.indexer.collection().count().await, 0);
    assert_eq!(fixture.indexer.stats().total_removed, 1);
}

#[tokio::test]
async fn test_directory_moved_away_and_recreated_is_watched_again() {
    let project = project(&[("a/b/old.txt", b"old\n")]);
    let outside = TempDir::new().unwrap();
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    let root = fixture.indexer.root().to_path_buf();
    fixture.indexer.add_watches_recursive(&root, &registry);
    fixture.indexer.bulk_index().await;
    assert!(registry.is_watched(&root.join("a/b")));

    fs::rename(root.join("a"), outside.path().join("a")).unwrap();
    fixture
        .indexer
        .handle_event(FileEvent::Renamed(root.join("a")), &registry)
        .await;

    assert!(!registry.is_watched(&root.join("a")));
    assert!(!registry.is_watched(&root.join("a/b")));
    assert!(indexed_names(&fixture.indexer).await.is_empty());

    write(project.path(), "a/b/new.txt", b"recreated\n");
    fixture
        .indexer
        .handle_event(FileEvent::Created(root.join("a")), &registry)
        .await;

    assert!(registry.is_watched(&root.join("a/b")));
    assert_eq!(indexed_names(&fixture.indexer).await, vec!["a/b/new.txt"]);
}

#[tokio::test]
async fn test_new_directory_is_watched_and_indexed() {
    let project = project(&[]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    let root = fixture.indexer.root().to_path_buf();
    fixture.indexer.add_watches_recursive(&root, &registry);

    write(project.path(), "pkg/util/strings.go", b"package util\n");
    write(project.path(), "pkg/doc.txt", b"docs\n");
    fixture
        .indexer
        .handle_event(FileEvent::Created(root.join("pkg")), &registry)
        .await;

    assert!(registry.is_watched(&root.join("pkg")));
    assert!(registry.is_watched(&root.join("pkg/util")));
    assert_eq!(indexed_names(&fixture.indexer).await, vec!["pkg/doc.txt", "pkg/util/strings.go"]);
}

#[tokio::test]
async fn test_removed_directory_is_unwatched_and_dropped() {
    let project = project(&[("pkg/a.txt", b"a\n"), ("pkg/sub/b.txt", b"b\n"), ("pkgx.txt", b"x\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    let root = fixture.indexer.root().to_path_buf();
    fixture.indexer.add_watches_recursive(&root, &registry);
    fixture.indexer.bulk_index().await;

    fs::remove_dir_all(root.join("pkg")).unwrap();
    fixture
        .indexer
        .handle_event(FileEvent::Removed(root.join("pkg")), &registry)
        .await;

    assert!(!registry.is_watched(&root.join("pkg")));
    assert_eq!(indexed_names(&fixture.indexer).await, vec!["pkgx.txt"]);
}

#[tokio::test]
async fn test_rename_moves_document() {
    let project = project(&[("old.txt", b"moving content\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = FakeRegistry::default();
    let root = fixture.indexer.root().to_path_buf();
    fixture.indexer.bulk_index().await;

    fs::rename(root.join("old.txt"), root.join("new.txt")).unwrap();
    fixture
        .indexer
        .handle_event(FileEvent::Renamed(root.join("old.txt")), &registry)
        .await;
    fixture
        .indexer
        .handle_event(FileEvent::Created(root.join("new.txt")), &registry)
        .await;

    assert_eq!(indexed_names(&fixture.indexer).await, vec!["new.txt"]);
}

// ============================================================================
// Background task
// ============================================================================

#[tokio::test]
async fn test_start_with_synthetic_events() {
    let project = project(&[("main.go", b"package main\n")]);
    let fixture = offline_indexer(&project).await;
    let registry = Arc::new(FakeRegistry::default());
    let (tx, rx) = mpsc::channel(8);
    let root = fixture.indexer.root().to_path_buf();

    let mut handle = Arc::clone(&fixture.indexer).start_with(registry.clone(), rx);
    handle.wait_until_watching().await.unwrap();

    assert_eq!(handle.state(), IndexerState::Watching);
    assert!(registry.is_watched(&root));
    assert_eq!(fixture.indexer.collection().count().await, 1);

    write(project.path(), "extra.txt", b"late arrival\n");
    tx.send(FileEvent::Created(root.join("extra.txt"))).await.unwrap();
    drop(tx);
    handle.join().await.unwrap();

    assert_eq!(indexed_names(&fixture.indexer).await, vec!["extra.txt", "main.go"]);
}

#[tokio::test]
async fn test_state_transitions_are_observable() {
    let project = project(&[]);
    let fixture = offline_indexer(&project).await;
    let mut states = fixture.indexer.subscribe();
    let (_tx, rx) = mpsc::channel(1);

    let handle = Arc::clone(&fixture.indexer).start_with(Arc::new(FakeRegistry::default()), rx);

    states
        .wait_for(|state| *state == IndexerState::Watching)
        .await
        .unwrap();
    assert!(!handle.is_finished());
    handle.abort();
}
