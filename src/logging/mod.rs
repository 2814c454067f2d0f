//! Logging system for fnord
//!
//! Installs a `tracing` subscriber with an env filter, an optional stderr
//! layer and an optional non-blocking rolling file layer.

mod config;


pub use config::{LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log file name inside the log directory
pub const LOG_FILE_NAME: &str = "fnord.log";

/// Logging system errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationError(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationError(String),
}

/// Result type for logging operations
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Installed logging state; dropping it flushes the file writer
pub struct LoggingSystem {
    config: LoggingConfig,
    log_directory: Option<PathBuf>,
    _guards: Vec<WorkerGuard>,
}

impl std::fmt::Debug for LoggingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingSystem")
            .field("level", &self.config.level)
            .field("output", &self.config.output)
            .field("log_directory", &self.log_directory)
            .finish()
    }
}

impl LoggingSystem {
    /// Initialize the logging system with the given configuration
    pub fn init(config: LoggingConfig) -> LoggingResult<Self> {
        let log_directory = match config.output {
            LogOutput::Console => None,
            LogOutput::File | LogOutput::Both => {
                let dir = config
                    .log_directory
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("logs"));
                std::fs::create_dir_all(&dir).map_err(|e| {
                    LoggingError::DirectoryCreationError(format!(
                        "Failed to create log directory {:?}: {}",
                        dir, e
                    ))
                })?;
                Some(dir)
            }
        };

        let mut guards = Vec::new();
        let env_filter = Self::build_env_filter(&config);
        let registry = tracing_subscriber::registry();

        let result = match (&config.output, &log_directory) {
            (LogOutput::Console, _) | (_, None) => registry
                .with(env_filter)
                .with(Self::create_console_layer(&config))
                .try_init(),
            (LogOutput::File, Some(dir)) => {
                let (file_layer, guard) = Self::create_file_layer(&config, dir);
                guards.push(guard);
                registry.with(env_filter).with(file_layer).try_init()
            }
            (LogOutput::Both, Some(dir)) => {
                let (file_layer, guard) = Self::create_file_layer(&config, dir);
                guards.push(guard);
                registry
                    .with(env_filter)
                    .with(Self::create_console_layer(&config))
                    .with(file_layer)
                    .try_init()
            }
        };
        result.map_err(|e| LoggingError::InitializationError(e.to_string()))?;

        tracing::debug!(level = %config.level, output = ?config.output, "Logging initialized");

        Ok(Self {
            config,
            log_directory,
            _guards: guards,
        })
    }

    /// Build the filter; `RUST_LOG` wins over the configured levels
    pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        Self::config_filter(config)
    }

    pub(crate) fn config_filter(config: &LoggingConfig) -> EnvFilter {
        let mut filter = EnvFilter::new(config.level.as_str());
        for (module, level) in &config.module_levels {
            filter = filter.add_directive(
                format!("{}={}", module, level)
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::INFO.into()),
            );
        }
        filter
    }

    fn create_console_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target);

        if config.format == LogFormat::Json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }

    fn create_file_layer<S>(
        config: &LoggingConfig,
        log_dir: &Path,
    ) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let rotation = match config.rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        };

        let file_appender = RollingFileAppender::new(rotation, log_dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(config.include_target)
            .with_ansi(false);

        if config.format == LogFormat::Json {
            (layer.json().boxed(), guard)
        } else {
            (layer.boxed(), guard)
        }
    }

    /// Directory receiving log files, if file output is enabled
    pub fn log_directory(&self) -> Option<&Path> {
        self.log_directory.as_deref()
    }

    /// Configured log level
    pub fn log_level(&self) -> LogLevel {
        self.config.level
    }
}
