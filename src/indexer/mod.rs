//! Project indexer
//!
//! Keeps a `project_files:<root>` collection in sync with a version
//! controlled directory tree:
//! - one bulk scan at start, upserted as a single batch
//! - incremental updates driven by filesystem events afterwards
//! - per-file failures are logged and skipped, never fatal

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub mod error;
#[cfg(test)]
mod tests;

pub use error::IndexError;

use crate::core::config::IndexerSettings;
use crate::core::utils::hash_content;
use crate::vector::{concurrency, metadata_keys, Collection, Document};
use crate::watcher::{FileEvent, FsWatcher, IgnoreRules, ProjectFilter, WatchRegistry, IGNORE_FILE, VCS_DIR};

/// Result type for indexer operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Lifecycle of an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    Uninitialized,
    BulkIndexing,
    Watching,
}

/// Statistics for the indexer
#[derive(Debug, Default)]
pub struct IndexerStats {
    /// Files written to the collection
    pub total_indexed: AtomicU64,
    /// Files skipped because their content did not change
    pub total_unchanged: AtomicU64,
    /// Files removed from the collection
    pub total_removed: AtomicU64,
    /// Files that failed to read or upsert
    pub total_failed: AtomicU64,
}

impl IndexerStats {
    /// Create a snapshot of current stats
    pub fn snapshot(&self) -> IndexerStatsSnapshot {
        IndexerStatsSnapshot {
            total_indexed: self.total_indexed.load(Ordering::SeqCst),
            total_unchanged: self.total_unchanged.load(Ordering::SeqCst),
            total_removed: self.total_removed.load(Ordering::SeqCst),
            total_failed: self.total_failed.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of indexer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexerStatsSnapshot {
    pub total_indexed: u64,
    pub total_unchanged: u64,
    pub total_removed: u64,
    pub total_failed: u64,
}

/// Outcome of a bulk scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Eligible files found by the walk
    pub eligible: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Stored documents whose file is gone or no longer eligible
    pub removed: usize,
}

/// Synchronizes one project root with its collection
pub struct ProjectIndexer {
    root: PathBuf,
    filter: ProjectFilter,
    collection: Arc<Collection>,
    settings: IndexerSettings,
    stats: IndexerStats,
    state: watch::Sender<IndexerState>,
}

impl std::fmt::Debug for ProjectIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectIndexer")
            .field("root", &self.root)
            .field("collection", &self.collection.name())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ProjectIndexer {
    /// Prepare an indexer for `root`
    ///
    /// Fails if the root has no `.git` or its `.gitignore` cannot be parsed.
    pub fn new(root: impl AsRef<Path>, collection: Arc<Collection>, settings: IndexerSettings) -> IndexResult<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|e| IndexError::io(root, e))?;

        if !root.join(VCS_DIR).exists() {
            return Err(IndexError::NotVersionControlled { root });
        }

        let rules = IgnoreRules::load(&root).map_err(|e| IndexError::IgnoreFile {
            path: root.join(IGNORE_FILE),
            reason: e.to_string(),
        })?;
        debug!("Loaded {} ignore patterns for {:?}", rules.len(), root);

        let (state, _) = watch::channel(IndexerState::Uninitialized);

        Ok(Self {
            root,
            filter: ProjectFilter::new(rules),
            collection,
            settings,
            stats: IndexerStats::default(),
            state,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn filter(&self) -> &ProjectFilter {
        &self.filter
    }

    pub fn stats(&self) -> IndexerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn state(&self) -> IndexerState {
        *self.state.borrow()
    }

    /// Receiver that observes state transitions
    pub fn subscribe(&self) -> watch::Receiver<IndexerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: IndexerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!("Indexer for {:?}: {:?} -> {:?}", self.root, previous, state);
        }
    }

    /// Whether `path` passes the ignore rules and is not binary
    pub fn can_index(&self, path: &Path) -> bool {
        self.filter.can_index(path)
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Eligible files under `dir`, sorted
    pub fn collect_eligible(&self, dir: &Path) -> Vec<PathBuf> {
        let filter = &self.filter;
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !entry.file_type().is_dir() || filter.should_enter(entry.path()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", dir, e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| filter.can_index(path))
            .collect();
        paths.sort();
        paths
    }

    /// Directories under `dir` (inclusive) that should be watched
    fn collect_dirs(&self, dir: &Path) -> Vec<PathBuf> {
        let filter = &self.filter;
        WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.file_type().is_dir() && filter.should_enter(entry.path()))
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Watch `dir` and every eligible directory below it
    ///
    /// Returns the number of directories newly watched.
    pub fn add_watches_recursive(&self, dir: &Path, registry: &dyn WatchRegistry) -> usize {
        let mut added = 0;
        for dir in self.collect_dirs(dir) {
            if registry.is_watched(&dir) {
                continue;
            }
            match registry.watch(&dir) {
                Ok(()) => added += 1,
                Err(e) => warn!("{}", e),
            }
        }
        added
    }

    /// Read `path` into a Document; `None` when the stored copy is current
    async fn build_document(&self, path: &Path) -> IndexResult<Option<Document>> {
        let bytes = tokio::fs::read(path).await.map_err(|e| IndexError::io(path, e))?;
        let digest = hash_content(&bytes);
        let id = path.to_string_lossy().into_owned();

        if let Ok(existing) = self.collection.get_by_id(&id).await {
            if existing.meta(metadata_keys::DIGEST) == Some(digest.as_str()) {
                return Ok(None);
            }
        }

        let content = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Some(
            Document::new(id.clone(), content)
                .with_metadata(metadata_keys::HASH, id)
                .with_metadata(metadata_keys::DIGEST, digest),
        ))
    }

    /// Index every eligible file under the root in one batch
    pub async fn bulk_index(&self) -> BulkReport {
        self.set_state(IndexerState::BulkIndexing);
        let report = self.index_tree(&self.root).await;
        info!(
            "Bulk indexed {:?}: {} eligible, {} indexed, {} unchanged, {} removed, {} failed",
            self.root, report.eligible, report.indexed, report.unchanged, report.removed, report.failed
        );
        report
    }

    async fn index_tree(&self, dir: &Path) -> BulkReport {
        let paths = self.collect_eligible(dir);
        let mut report = BulkReport {
            eligible: paths.len(),
            removed: self.prune_stale(dir, &paths).await,
            ..BulkReport::default()
        };

        let mut documents = Vec::with_capacity(paths.len());
        for path in &paths {
            match self.build_document(path).await {
                Ok(Some(document)) => documents.push(document),
                Ok(None) => report.unchanged += 1,
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    report.failed += 1;
                }
            }
        }
        self.stats.total_unchanged.fetch_add(report.unchanged as u64, Ordering::SeqCst);

        if documents.is_empty() {
            self.stats.total_failed.fetch_add(report.failed as u64, Ordering::SeqCst);
            return report;
        }

        let batch = documents.len();
        match self.collection.upsert(documents.clone(), self.settings.bulk_concurrency).await {
            Ok(()) => report.indexed = batch,
            Err(e) => {
                warn!("Batch upsert of {} files failed, retrying one by one: {}", batch, e);
                let results: Vec<(String, bool)> = stream::iter(documents)
                    .map(|document| async move {
                        let id = document.id.clone();
                        match self.collection.upsert(vec![document], 1).await {
                            Ok(()) => (id, true),
                            Err(e) => {
                                warn!("Failed to index {}: {}", id, e);
                                (id, false)
                            }
                        }
                    })
                    .buffer_unordered(concurrency::SINGLE)
                    .collect()
                    .await;
                report.indexed = results.iter().filter(|(_, ok)| *ok).count();
                report.failed += batch - report.indexed;
            }
        }

        self.stats.total_indexed.fetch_add(report.indexed as u64, Ordering::SeqCst);
        self.stats.total_failed.fetch_add(report.failed as u64, Ordering::SeqCst);
        report
    }

    /// Delete documents stored under `dir` that are not in `eligible`
    async fn prune_stale(&self, dir: &Path, eligible: &[PathBuf]) -> usize {
        let keep: HashSet<String> = eligible
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let stale: Vec<String> = self
            .stored_under(dir)
            .await
            .into_iter()
            .filter(|id| !keep.contains(id))
            .collect();
        if stale.is_empty() {
            return 0;
        }

        match self.collection.delete(&stale).await {
            Ok(removed) => {
                self.stats.total_removed.fetch_add(removed as u64, Ordering::SeqCst);
                debug!("Pruned {} stale documents under {:?}", removed, dir);
                removed
            }
            Err(e) => {
                warn!("Failed to prune stale documents under {:?}: {}", dir, e);
                0
            }
        }
    }

    /// IDs of documents for `path` itself or anything beneath it
    async fn stored_under(&self, path: &Path) -> Vec<String> {
        let id = path.to_string_lossy().into_owned();
        let prefix = format!("{}{}", id, std::path::MAIN_SEPARATOR);

        self.collection
            .ids()
            .await
            .into_iter()
            .filter(|candidate| *candidate == id || candidate.starts_with(&prefix))
            .collect()
    }

    // ========================================================================
    // Incremental updates
    // ========================================================================

    /// Re-index one file if eligible; returns whether it was written
    ///
    /// A file that is no longer eligible is dropped from the collection.
    pub async fn index_path(&self, path: &Path) -> IndexResult<bool> {
        if !self.can_index(path) {
            debug!("Not indexing {:?}", path);
            self.remove_path(path).await?;
            return Ok(false);
        }

        let Some(document) = self.build_document(path).await? else {
            self.stats.total_unchanged.fetch_add(1, Ordering::SeqCst);
            return Ok(false);
        };

        if let Err(e) = self.collection.upsert(vec![document], concurrency::SINGLE).await {
            self.stats.total_failed.fetch_add(1, Ordering::SeqCst);
            return Err(e.into());
        }
        self.stats.total_indexed.fetch_add(1, Ordering::SeqCst);
        debug!("Indexed {:?}", path);
        Ok(true)
    }

    /// Drop `path` and anything stored beneath it from the collection
    pub async fn remove_path(&self, path: &Path) -> IndexResult<usize> {
        let ids = self.stored_under(path).await;
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self.collection.delete(&ids).await?;
        if removed > 0 {
            self.stats.total_removed.fetch_add(removed as u64, Ordering::SeqCst);
            debug!("Removed {} documents for {:?}", removed, path);
        }
        Ok(removed)
    }

    /// Forget a path that no longer exists
    async fn forget(&self, path: &Path, registry: &dyn WatchRegistry) {
        let unwatched = registry.unwatch_recursive(path);
        if unwatched > 0 {
            debug!("Stopped watching {} directories under {:?}", unwatched, path);
        }
        if let Err(e) = self.remove_path(path).await {
            warn!("Failed to remove {:?} from index: {}", path, e);
        }
    }

    /// Apply one filesystem event
    pub async fn handle_event(&self, event: FileEvent, registry: &dyn WatchRegistry) {
        debug!("Event: {:?}", event);

        match event {
            FileEvent::Removed(path) => match tokio::fs::symlink_metadata(&path).await {
                Err(_) => self.forget(&path, registry).await,
                Ok(meta) if meta.is_dir() => {
                    registry.unwatch_recursive(&path);
                }
                Ok(_) => {
                    if let Err(e) = self.remove_path(&path).await {
                        warn!("Failed to remove {:?} from index: {}", path, e);
                    }
                }
            },
            FileEvent::Created(path) | FileEvent::Modified(path) | FileEvent::Renamed(path) => {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) if meta.is_dir() => {
                        if !self.filter.should_enter(&path) {
                            return;
                        }
                        let added = self.add_watches_recursive(&path, registry);
                        let report = self.index_tree(&path).await;
                        debug!(
                            "New directory {:?}: {} watched, {} files indexed",
                            path, added, report.indexed
                        );
                    }
                    Ok(_) => {
                        if let Err(e) = self.index_path(&path).await {
                            warn!("Failed to index {:?}: {}", path, e);
                        }
                    }
                    // gone already, e.g. the source of a rename
                    Err(_) => self.forget(&path, registry).await,
                }
            }
        }
    }

    /// Watch, scan, then apply events until the channel closes
    pub async fn run(&self, registry: &dyn WatchRegistry, mut events: mpsc::Receiver<FileEvent>) {
        let watched = self.add_watches_recursive(&self.root, registry);
        debug!("Watching {} directories under {:?}", watched, self.root);

        self.bulk_index().await;
        self.set_state(IndexerState::Watching);

        while let Some(event) = events.recv().await {
            self.handle_event(event, registry).await;
        }
        info!("Event stream for {:?} closed", self.root);
    }

    /// Spawn the indexer on a notify watcher as a detached task
    pub fn start(self: Arc<Self>) -> IndexResult<IndexerHandle> {
        let (watcher, events) = FsWatcher::new(self.settings.event_buffer)?;
        Ok(self.start_with(Arc::new(watcher), events))
    }

    /// Spawn the indexer on an arbitrary registry and event source
    pub fn start_with(self: Arc<Self>, registry: Arc<dyn WatchRegistry>, events: mpsc::Receiver<FileEvent>) -> IndexerHandle {
        let state = self.subscribe();
        let indexer = Arc::clone(&self);
        let task = tokio::spawn(async move {
            indexer.run(registry.as_ref(), events).await;
        });
        IndexerHandle {
            indexer: self,
            state,
            task,
        }
    }
}

/// Handle to a running indexer task
pub struct IndexerHandle {
    indexer: Arc<ProjectIndexer>,
    state: watch::Receiver<IndexerState>,
    task: JoinHandle<()>,
}

impl IndexerHandle {
    pub fn indexer(&self) -> &Arc<ProjectIndexer> {
        &self.indexer
    }

    pub fn state(&self) -> IndexerState {
        *self.state.borrow()
    }

    /// Wait for the bulk scan to finish
    pub async fn wait_until_watching(&mut self) -> IndexResult<()> {
        self.state
            .wait_for(|state| *state == IndexerState::Watching)
            .await
            .map(|_| ())
            .map_err(|e| IndexError::Task { reason: e.to_string() })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the background task
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the task to end, which happens once its event source closes
    pub async fn join(self) -> IndexResult<()> {
        self.task.await.map_err(|e| {
            error!("Indexer task for {:?} failed: {}", self.indexer.root, e);
            IndexError::Task { reason: e.to_string() }
        })
    }
}
