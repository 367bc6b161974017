//! src/config.rs
//! ============================================================================
//! # PluginConfig: runtime configuration loaded from TOML
//!
//! Looked up at an explicit path or in the platform config directory from
//! [`directories`](https://docs.rs/directories). A missing file means
//! defaults; a malformed one is an error.
//!
//! ```toml
//! [logging]
//! log_level = "debug"
//! stderr = true
//!
//! [key_timing.overrides."com.example.volume"]
//! long_press = "600ms"
//! double_press = "300ms"
//!
//! [shutdown]
//! drain_timeout = "3s"
//! ```

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use ahash::RandomState;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing::info;

use crate::controller::key_timing::KeyTiming;
use crate::error::{DeckError, DeckResult};
use crate::logging::LoggerConfig;

/// Press thresholds per action id, replacing what the handler asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyTimingConfig {
    pub overrides: HashMap<String, KeyTiming, RandomState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on waiting for running handlers; unset waits forever.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Option<Duration>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Debug-log every outbound frame.
    pub log_payloads: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub logging: LoggerConfig,
    pub key_timing: KeyTimingConfig,
    pub shutdown: ShutdownConfig,
    pub outbound: OutboundConfig,
}

impl PluginConfig {
    /// Load from `path`, or from [`Self::config_path`] when `None`.
    ///
    /// # Errors
    ///
    /// `ConfigIo` when the file exists but cannot be read, `Config` when it
    /// is not valid TOML for this shape.
    pub async fn load(path: Option<&Path>) -> DeckResult<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::config_path) else {
            info!("No config directory available, using default configuration");
            return Ok(Self::default());
        };

        match TokioFs::read_to_string(&path).await {
            Ok(text) => {
                info!("Loading config from {}", path.display());
                Self::from_toml_str(&text)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No config file found at {}, using default configuration",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(source) => Err(DeckError::ConfigIo { path, source }),
        }
    }

    /// # Errors
    ///
    /// `Config` with the TOML parse error.
    pub fn from_toml_str(text: &str) -> DeckResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Canonical config file location for this platform.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "deck", "deck-plugin")
            .map(|dirs: ProjectDirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogRotation;

    #[test]
    fn test_empty_document_is_all_defaults() {
        let config: PluginConfig = PluginConfig::from_toml_str("").unwrap();
        assert_eq!(config, PluginConfig::default());
        assert_eq!(config.shutdown.drain_timeout, Some(Duration::from_secs(5)));
        assert!(!config.outbound.log_payloads);
    }

    #[test]
    fn test_full_document() {
        let config: PluginConfig = PluginConfig::from_toml_str(
            r#"
            [logging]
            log_level = "debug"
            rotation = "never"

            [key_timing.overrides."com.example.volume"]
            long_press = "600ms"
            double_press = "300ms"

            [key_timing.overrides."com.example.mute"]
            double_press = "0s"

            [shutdown]
            drain_timeout = "1m"

            [outbound]
            log_payloads = true
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.logging.rotation, LogRotation::Never);
        assert_eq!(
            config.key_timing.overrides["com.example.volume"],
            KeyTiming::new(Duration::from_millis(600), Duration::from_millis(300))
        );
        assert_eq!(
            config.key_timing.overrides["com.example.mute"],
            KeyTiming::new(Duration::from_millis(800), Duration::ZERO)
        );
        assert_eq!(config.shutdown.drain_timeout, Some(Duration::from_secs(60)));
        assert!(config.outbound.log_payloads);
    }

    #[test]
    fn test_malformed_document_is_a_config_error() {
        let err: DeckError = PluginConfig::from_toml_str("[shutdown]\ndrain_timeout = 12").unwrap_err();
        assert!(matches!(err, DeckError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_reads_file_and_tolerates_missing_one() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();

        let missing: PluginConfig = PluginConfig::load(Some(&dir.path().join("absent.toml")))
            .await
            .unwrap();
        assert_eq!(missing, PluginConfig::default());

        let path: PathBuf = dir.path().join("config.toml");
        std::fs::write(&path, "[outbound]\nlog_payloads = true\n").unwrap();
        let loaded: PluginConfig = PluginConfig::load(Some(&path)).await.unwrap();
        assert!(loaded.outbound.log_payloads);
    }

    #[tokio::test]
    async fn test_unreadable_path_is_config_io() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let err: DeckError = PluginConfig::load(Some(dir.path())).await.unwrap_err();
        assert!(matches!(err, DeckError::ConfigIo { .. }));
    }
}
