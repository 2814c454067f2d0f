//! File Watcher Module
//!
//! Non-recursive directory watches over notify-rs, translated into
//! [`FileEvent`]s on a tokio channel. The indexer talks to the watch set
//! through [`WatchRegistry`] so it can be driven by synthetic events.

mod filter;
pub mod sniff;

pub use filter::{
    is_vcs_metadata, FilterReason, FilterResult, IgnoreRules, ProjectFilter, IGNORE_FILE, VCS_DIR,
};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// File system event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Path was created
    Created(PathBuf),
    /// File content was written
    Modified(PathBuf),
    /// Path was renamed away from or to this name
    Renamed(PathBuf),
    /// Path was deleted
    Removed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Created(p) | FileEvent::Modified(p) | FileEvent::Renamed(p) | FileEvent::Removed(p) => p,
        }
    }
}

/// Watch backend errors
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to start watcher: {reason}")]
    Init { reason: String },

    #[error("Failed to watch {path:?}: {reason}")]
    Watch { path: PathBuf, reason: String },
}

/// The set of watched directories
pub trait WatchRegistry: Send + Sync {
    /// Start watching `dir` (non-recursively)
    fn watch(&self, dir: &Path) -> Result<(), WatcherError>;

    /// Stop watching `dir`; unknown directories are ignored
    fn unwatch(&self, dir: &Path);

    fn is_watched(&self, dir: &Path) -> bool;

    /// Watched directories at or below `dir`
    fn watched_under(&self, dir: &Path) -> Vec<PathBuf>;

    /// Stop watching `dir` and everything below it; returns how many were dropped
    fn unwatch_recursive(&self, dir: &Path) -> usize {
        let watched = self.watched_under(dir);
        for path in &watched {
            self.unwatch(path);
        }
        watched.len()
    }
}

/// Translate a notify event into zero or more file events
pub fn translate(event: Event) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(FileEvent::Created).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(FileEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut events = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                events.push(FileEvent::Renamed(from));
            }
            if let Some(to) = paths.next() {
                events.push(FileEvent::Created(to));
            }
            events
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(FileEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => event.paths.into_iter().map(FileEvent::Renamed).collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event.paths.into_iter().map(FileEvent::Modified).collect(),
        _ => Vec::new(),
    }
}

/// notify-backed [`WatchRegistry`]
pub struct FsWatcher {
    watcher: Mutex<RecommendedWatcher>,
    watched: Mutex<HashSet<PathBuf>>,
}

impl FsWatcher {
    /// Create a watcher whose events arrive on the returned receiver
    pub fn new(buffer: usize) -> Result<(Self, mpsc::Receiver<FileEvent>), WatcherError> {
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for file_event in translate(event) {
                    if tx.blocking_send(file_event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        })
        .map_err(|e| WatcherError::Init { reason: e.to_string() })?;

        Ok((
            Self {
                watcher: Mutex::new(watcher),
                watched: Mutex::new(HashSet::new()),
            },
            rx,
        ))
    }

    /// Watched directories
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }
}

impl WatchRegistry for FsWatcher {
    fn watch(&self, dir: &Path) -> Result<(), WatcherError> {
        if self.is_watched(dir) {
            return Ok(());
        }
        self.watcher
            .lock()
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::Watch {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        self.watched.lock().insert(dir.to_path_buf());
        debug!("Watching {:?}", dir);
        Ok(())
    }

    fn unwatch(&self, dir: &Path) {
        if self.watched.lock().remove(dir) {
            if let Err(e) = self.watcher.lock().unwatch(dir) {
                debug!("Unwatch of {:?} failed: {}", dir, e);
            }
        }
    }

    fn is_watched(&self, dir: &Path) -> bool {
        self.watched.lock().contains(dir)
    }

    fn watched_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.watched
            .lock()
            .iter()
            .filter(|path| path.starts_with(dir))
            .cloned()
            .collect()
    }
}
