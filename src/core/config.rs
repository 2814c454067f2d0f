//! Configuration for fnord
//!
//! Resolved once per process from environment variables, with optional
//! tuning read from `<home>/config.json`. Environment variables win over
//! the file.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::OpenAiConfig;
use crate::logging::{LogLevel, LoggingConfig};

/// Environment variable names
pub mod env {
    pub const HOME: &str = "FNORD_HOME";
    pub const BOX: &str = "FNORD_BOX";
    pub const PROJECT: &str = "FNORD_PROJECT";
    pub const TESTING: &str = "FNORD_TESTING";
    pub const OPENAI_API_KEY: &str = "FNORD_OPENAI_API_KEY";
    pub const LOG_LEVEL: &str = "FNORD_LOG";
}

/// Box used when none is configured
pub const DEFAULT_BOX: &str = "default";

/// Box forced by testing mode
pub const TESTING_BOX: &str = "testing";

/// Settings file inside the home directory
pub const SETTINGS_FILE: &str = "config.json";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in settings file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid box name '{name}': {reason}")]
    InvalidBox { name: String, reason: String },

    #[error("Invalid project path {path}: {reason}")]
    InvalidProject { path: PathBuf, reason: String },

    #[error("Cannot determine home directory: {0}")]
    NoHome(String),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

// ============================================================================
// Settings file
// ============================================================================

/// Retrieval tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Bound on embedding plus query, in milliseconds; 0 disables it
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,

    /// Ask the model for a short retrieval query before searching
    #[serde(default = "default_true")]
    pub distill_queries: bool,

    /// Results requested from each collection when gathering context
    #[serde(default = "default_results_per_source")]
    pub results_per_source: usize,
}

fn default_search_timeout_ms() -> u64 {
    20_000
}

fn default_results_per_source() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_search_timeout_ms(),
            distill_queries: true,
            results_per_source: default_results_per_source(),
        }
    }
}

/// Project indexer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Index the configured project at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upsert parallelism of the initial scan
    #[serde(default = "default_bulk_concurrency")]
    pub bulk_concurrency: usize,

    /// Capacity of the filesystem event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_bulk_concurrency() -> usize {
    crate::vector::concurrency::BULK_INDEX
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bulk_concurrency: default_bulk_concurrency(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Background conversation persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersisterSettings {
    /// Pending save requests before submitters wait
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_queue_depth() -> usize {
    16
}

impl Default for PersisterSettings {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

/// Language model provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_model_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_model_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            completion_model: default_completion_model(),
            timeout_ms: default_model_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Contents of `<home>/config.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub persister: PersisterSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Read the settings file, or defaults when it does not exist
    pub fn load(path: &Path) -> ConfigResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Application configuration
// ============================================================================

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of all fnord state
    pub home: PathBuf,
    /// Active box
    pub box_name: String,
    /// Project root to index, if any
    pub project: Option<PathBuf>,
    /// OpenAI key; the offline model is used without one
    pub openai_api_key: Option<SecretString>,
    /// Tuning from the settings file
    pub settings: Settings,
}

impl AppConfig {
    /// Configuration for `home` and `box_name` with default settings
    pub fn new(home: impl Into<PathBuf>, box_name: &str) -> ConfigResult<Self> {
        validate_box_name(box_name)?;
        Ok(Self {
            home: home.into(),
            box_name: box_name.to_string(),
            project: None,
            openai_api_key: None,
            settings: Settings::default(),
        })
    }

    /// Resolve from the process environment
    pub fn load() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for environment variables
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home = match var(env::HOME) {
            Some(home) => PathBuf::from(home),
            None => dirs::home_dir()
                .map(|h| h.join(".config").join("fnord"))
                .ok_or_else(|| ConfigError::NoHome("no user home directory".to_string()))?,
        };

        let box_name = if var(env::TESTING).is_some() {
            TESTING_BOX.to_string()
        } else {
            var(env::BOX).unwrap_or_else(|| DEFAULT_BOX.to_string())
        };

        let mut config = Self::new(home, &box_name)?;
        config.settings = Settings::load(&config.home.join(SETTINGS_FILE))?;

        if let Some(project) = var(env::PROJECT) {
            config = config.with_project(project)?;
        }

        config.openai_api_key = var(env::OPENAI_API_KEY).map(SecretString::new);

        if let Some(level) = var(env::LOG_LEVEL) {
            match level.parse::<LogLevel>() {
                Ok(level) => config.settings.logging.level = level,
                Err(e) => tracing::warn!("Ignoring {}: {}", env::LOG_LEVEL, e),
            }
        }

        Ok(config)
    }

    /// Set the project root; it must be an existing directory
    pub fn with_project(mut self, project: impl Into<PathBuf>) -> ConfigResult<Self> {
        let project = project.into();
        let canonical = std::fs::canonicalize(&project).map_err(|e| ConfigError::InvalidProject {
            path: project.clone(),
            reason: e.to_string(),
        })?;
        if !canonical.is_dir() {
            return Err(ConfigError::InvalidProject {
                path: project,
                reason: "not a directory".to_string(),
            });
        }
        self.project = Some(canonical);
        Ok(self)
    }

    /// Directory of the active box
    pub fn box_path(&self) -> PathBuf {
        self.home.join(&self.box_name)
    }

    /// Conversation ledger directory of the active box
    pub fn conversations_dir(&self) -> PathBuf {
        self.box_path().join("conversations")
    }

    /// Root of every embedding store, shared by all boxes
    pub fn vector_store_path(&self) -> PathBuf {
        self.home.join("vector_store")
    }

    /// Embedding store for one embedding space
    pub fn embedding_store_path(&self, space: &str) -> PathBuf {
        self.vector_store_path().join(space)
    }

    /// Logging configuration with the log directory resolved
    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = self.settings.logging.clone();
        if logging.log_directory.is_none() {
            logging.log_directory = Some(self.home.join("logs"));
        }
        logging
    }

    /// OpenAI client configuration, when a key is configured
    pub fn openai_config(&self) -> Option<OpenAiConfig> {
        let api_key = self.openai_api_key.clone()?;
        let model = &self.settings.model;
        Some(OpenAiConfig {
            base_url: model.base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: model.embedding_model.clone(),
            embedding_dimensions: model.embedding_dimensions,
            completion_model: model.completion_model.clone(),
            timeout_ms: model.timeout_ms,
            max_retries: model.max_retries,
        })
    }
}

/// A box name must be non-empty and free of path separators
pub fn validate_box_name(name: &str) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::InvalidBox {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ConfigError::InvalidBox {
            name: name.to_string(),
            reason: "must not contain path separators".to_string(),
        });
    }
    if name == "." || name == ".." {
        return Err(ConfigError::InvalidBox {
            name: name.to_string(),
            reason: "must not be a relative path component".to_string(),
        });
    }
    Ok(())
}
