//! Durable record writer
//!
//! Every on-disk record fnord owns goes through [`DurableWriter`]:
//! - write the new bytes to `<file>.tmp` and fsync them
//! - rotate the current file to `<file>.bak` (single generation)
//! - atomically rename the temp file into place
//!
//! A crash at any point leaves either the previous or the new version at
//! the final path, never a torn file.

use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Persistence error types
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed for {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },
}

impl PersistError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Path of the record that failed to persist
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Serialization { path, .. } => path,
        }
    }
}

/// Persistence result type
pub type PersistResult<T> = Result<T, PersistError>;

/// Writes whole records with temp-file, fsync, backup and atomic rename
#[derive(Debug, Clone)]
pub struct DurableWriter {
    keep_backup: bool,
}

impl Default for DurableWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableWriter {
    /// Writer that keeps a single `.bak` generation of the previous record
    pub fn new() -> Self {
        Self { keep_backup: true }
    }

    /// Writer that skips the backup rotation
    pub fn without_backup() -> Self {
        Self { keep_backup: false }
    }

    /// Whether the previous version is rotated to `.bak`
    pub fn keeps_backup(&self) -> bool {
        self.keep_backup
    }

    /// Replace `path` with `bytes`
    pub async fn write(&self, path: &Path, bytes: &[u8]) -> PersistResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistError::io(parent, e))?;
        }

        let temp_path = sibling(path, "tmp");
        {
            let mut file = tokio::fs::File::create(&temp_path)
                .await
                .map_err(|e| PersistError::io(&temp_path, e))?;
            file.write_all(bytes)
                .await
                .map_err(|e| PersistError::io(&temp_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| PersistError::io(&temp_path, e))?;
        }

        if self.keep_backup && tokio::fs::try_exists(path).await.unwrap_or(false) {
            let backup_path = backup_path(path);
            if let Err(e) = tokio::fs::copy(path, &backup_path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to rotate backup");
            }
        }

        if let Err(e) = tokio::fs::rename(&temp_path, path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(PersistError::io(path, e));
        }

        Ok(())
    }

    /// Replace `path` with the pretty-printed JSON encoding of `value`
    pub async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> PersistResult<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistError::Serialization {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.write(path, &bytes).await
    }

    /// Replace `path` with one compact JSON record per line
    pub async fn write_lines<'a, T, I>(&self, path: &Path, records: I) -> PersistResult<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut bytes = Vec::new();
        for record in records {
            serde_json::to_writer(&mut bytes, record).map_err(|e| PersistError::Serialization {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            bytes.push(b'\n');
        }
        self.write(path, &bytes).await
    }
}

/// `<file>.bak` next to `path`
pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, "bak")
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("record"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
