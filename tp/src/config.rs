//! Tapdinner configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main Tapdinner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when no `--log-level` is given
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Local slot storage
    pub storage: StorageConfig,

    /// Remote sync
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tapdinner.yml
        let local_config = PathBuf::from(".tapdinner.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tapdinner/tapdinner.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tapdinner").join("tapdinner.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Where the three local slots live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Slot directory; `~/` is expanded
    pub path: Option<String>,
}

impl StorageConfig {
    /// Resolved slot directory
    pub fn slot_dir(&self) -> PathBuf {
        match &self.path {
            Some(p) if p.starts_with("~/") => dirs::home_dir()
                .map(|home| home.join(&p[2..]))
                .unwrap_or_else(|| PathBuf::from(&p[2..])),
            Some(p) => PathBuf::from(p),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tapdinner")
                .join("slots"),
        }
    }
}

/// Which remote backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncBackend {
    #[default]
    Firebase,
    None,
}

/// Remote sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub backend: SyncBackend,

    /// Realtime Database base URL
    #[serde(rename = "database-url")]
    pub database_url: String,

    /// Path under which channel documents are stored
    pub root: String,

    /// Write and connect timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backend: SyncBackend::Firebase,
            database_url: "https://mealshift-32f84-default-rtdb.firebaseio.com".to_string(),
            root: "dinnerData".to_string(),
            timeout_ms: 10_000,
        }
    }
}
