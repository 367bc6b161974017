//! src/logging.rs
//! ============================================================================
//! # Logging: JSON lines to a rolling file, optional human output on stderr
//!
//! The plugin's stdout/stdin may be the transport, so nothing is ever
//! written to stdout. Filtering starts from `RUST_LOG` and adds the
//! configured level as a directive.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::Directive,
    fmt::time::ChronoUtc,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub log_file_prefix: String,
    pub log_level: String,
    pub max_log_files: usize,
    pub rotation: LogRotation,
    /// Mirror events to stderr in the human readable format.
    pub stderr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "plugin".to_string(),
            log_level: "info".to_string(),
            max_log_files: 10,
            rotation: LogRotation::Daily,
            stderr: false,
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Self::NEVER,
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to create log file appender: {0}")]
    AppenderFailed(String),
}

pub struct Logger;

impl Logger {
    /// Install the global subscriber.
    ///
    /// Keep the returned guard alive for as long as logs should be written;
    /// dropping it flushes the file writer.
    ///
    /// # Errors
    ///
    /// Invalid config, an unusable log directory, or a subscriber that is
    /// already installed.
    pub async fn init(config: &LoggerConfig) -> Result<WorkerGuard, LoggingError> {
        let directive: Directive = validate_config(config)?;
        setup_log_directory(&config.log_dir).await?;

        let file_appender: RollingFileAppender = RollingFileAppender::builder()
            .rotation(config.rotation.into())
            .filename_prefix(config.log_file_prefix.as_str())
            .filename_suffix("jsonl")
            .max_log_files(config.max_log_files)
            .build(&config.log_dir)
            .map_err(|e| LoggingError::AppenderFailed(e.to_string()))?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let make_filter = || EnvFilter::from_default_env().add_directive(directive.clone());

        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(non_blocking)
            .with_filter(make_filter());

        let stderr_layer = config.stderr.then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoUtc::rfc_3339())
                .with_filter(make_filter())
        });

        tracing_subscriber::registry()
            .with(json_layer)
            .with(stderr_layer)
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)?;

        tracing::info!(
            log_dir = %config.log_dir.display(),
            level = %config.log_level,
            "Logging initialized"
        );
        Ok(guard)
    }
}

fn validate_config(config: &LoggerConfig) -> Result<Directive, LoggingError> {
    if config.max_log_files == 0 {
        return Err(LoggingError::ConfigError(
            "max_log_files must be greater than 0".to_string(),
        ));
    }

    if config.log_file_prefix.trim().is_empty() {
        return Err(LoggingError::ConfigError(
            "log_file_prefix must not be empty".to_string(),
        ));
    }

    validate_log_directory(&config.log_dir)?;

    Directive::from_str(&config.log_level).map_err(|e| {
        LoggingError::ConfigError(format!("invalid log level '{}': {e}", config.log_level))
    })
}

fn validate_log_directory(path: &Path) -> Result<(), LoggingError> {
    if path.components().count() == 0 {
        return Err(LoggingError::InvalidLogDirectory("Empty path".to_string()));
    }
    if path.is_file() {
        return Err(LoggingError::InvalidLogDirectory(format!(
            "{} is a file",
            path.display()
        )));
    }
    Ok(())
}

async fn setup_log_directory(log_dir: &Path) -> Result<(), LoggingError> {
    if !log_dir.exists() {
        TokioFs::create_dir_all(log_dir).await?;
    }
    Ok(())
}
