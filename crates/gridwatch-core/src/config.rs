//! GridWatch configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridWatchConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for GridWatchConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            provider: ProviderConfig::default(),
            regions: default_regions(),
            poller: PollerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl GridWatchConfig {
    /// Load config from the default path (~/.gridwatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::GridWatchError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::GridWatchError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::GridWatchError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the GridWatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gridwatch")
    }
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Long-poll timeout passed to getUpdates, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn bool_true() -> bool {
    true
}
fn default_poll_timeout() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            enabled: bool_true(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// Upstream schedule provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://app.yasno.ua/api/blackout-service/public/shutdowns".into()
}
fn default_request_timeout() -> u64 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// One region to poll. `region_id` and `dso_id` are the provider's
/// identifiers for the area and its distribution company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub region_id: String,
    pub dso_id: String,
}

fn default_regions() -> Vec<RegionConfig> {
    vec![RegionConfig {
        name: "kyiv".into(),
        region_id: "25".into(),
        dso_id: "902".into(),
    }]
}

/// Poll loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
    /// Whether the very first snapshot of a region is broadcast as "all
    /// intervals added". Off by default so a fresh deployment does not
    /// spam every subscriber with the entire current schedule.
    #[serde(default)]
    pub notify_on_first_run: bool,
}

fn default_interval() -> u64 {
    900
}
fn default_backoff_base() -> u64 {
    30
}
fn default_backoff_max() -> u64 {
    1800
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            notify_on_first_run: false,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    GridWatchConfig::home_dir()
        .join("gridwatch.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GridWatchConfig::default();
        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.regions[0].name, "kyiv");
        assert_eq!(config.poller.interval_secs, 900);
        assert!(!config.poller.notify_on_first_run);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            [telegram]
            bot_token = "123:abc"

            [[regions]]
            name = "dnipro"
            region_id = "12"
            dso_id = "310"

            [poller]
            interval_secs = 300
            notify_on_first_run = true
        "#;
        let config: GridWatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.regions[0].name, "dnipro");
        assert_eq!(config.poller.interval_secs, 300);
        assert!(config.poller.notify_on_first_run);
        // Untouched sections keep their defaults
        assert_eq!(config.provider.request_timeout_secs, 10);
    }
}
