//! Configuration management for Gas Watcher
//!
//! Persistent settings: price endpoint, refresh alarm interval, panel
//! staleness thresholds and whether storage survives restarts.
//! Supports Windows, macOS, and Linux.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::RefreshConfig;
use crate::panel::PanelConfig;
use crate::source::{GasNowConfig, DEFAULT_GASNOW_URL, DEFAULT_REQUEST_TIMEOUT};

/// Errors that can occur while saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config path")]
    NoConfigDir,

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write config: {0}")]
    Write(#[from] std::io::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Gas price endpoint
    pub api_url: String,
    /// Seconds a single price fetch may take
    pub request_timeout_secs: u64,
    /// Refresh alarm delay and period, in minutes
    pub refresh_interval: u32,
    /// Panel requests a refresh on open when data is at least this old
    pub stale_after_secs: u64,
    /// Panel requests a refresh while open when data is older than this
    pub auto_refresh_secs: u64,
    /// Interval of the panel's "last updated" ticker
    pub ticker_secs: u64,
    /// Keep gas data, selected tier and alert across restarts
    pub persist_storage: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GASNOW_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            refresh_interval: 1,
            stale_after_secs: 10,
            auto_refresh_secs: 20,
            ticker_secs: 2,
            persist_storage: true,
        }
    }
}

impl AppConfig {
    /// Gets the config directory path (cross-platform)
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|p| PathBuf::from(p).join("GasWatcher"))
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|p| PathBuf::from(p).join("Library/Application Support/GasWatcher"))
        }

        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|p| PathBuf::from(p).join(".config")))
                .map(|p| p.join("gaswatcher"))
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }

    /// Directory holding the persisted storage partitions
    pub fn storage_dir() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("storage"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    /// Loads configuration from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Saves configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Settings for the refresh agent
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig::with_interval_minutes(u64::from(self.refresh_interval.max(1)))
    }

    /// Settings for the panel controller
    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            stale_after: Duration::from_secs(self.stale_after_secs),
            auto_refresh_after: Duration::from_secs(self.auto_refresh_secs),
            ticker: Duration::from_secs(self.ticker_secs.max(1)),
        }
    }

    /// Settings for the price source
    pub fn source_config(&self) -> GasNowConfig {
        GasNowConfig {
            api_url: self.api_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.refresh_interval, 1);
        assert_eq!(config.stale_after_secs, 10);
        assert_eq!(config.auto_refresh_secs, 20);
        assert_eq!(config.ticker_secs, 2);
        assert_eq!(config.api_url, DEFAULT_GASNOW_URL);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = AppConfig {
            refresh_interval: 5,
            persist_storage: false,
            ..AppConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let loaded: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let loaded: AppConfig = serde_json::from_str(r#"{ "refresh_interval": 3 }"#).unwrap();
        assert_eq!(loaded.refresh_interval, 3);
        assert_eq!(loaded.ticker_secs, 2);
        assert!(loaded.persist_storage);
    }

    #[test]
    fn test_derived_configs() {
        let config = AppConfig {
            refresh_interval: 0,
            ..AppConfig::default()
        };

        let refresh = config.refresh_config();
        assert_eq!(refresh.delay, Duration::from_secs(60));
        assert_eq!(refresh.period, Duration::from_secs(60));

        let panel = config.panel_config();
        assert_eq!(panel.stale_after, Duration::from_secs(10));
        assert_eq!(panel.auto_refresh_after, Duration::from_secs(20));
        assert_eq!(panel.ticker, Duration::from_secs(2));

        let source = config.source_config();
        assert_eq!(source.api_url, DEFAULT_GASNOW_URL);
        assert_eq!(source.timeout, Duration::from_secs(15));
    }
}
