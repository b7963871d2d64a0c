//! # Engine Configuration
//!
//! Tunables for ingestion, caching and retention, stored in
//! `~/.config/launchrank/config.json`.
//!
//! ## Example
//!
//! ```json
//! {
//!   "self_package": "dev.launchrank",
//!   "write_debounce_ms": 1000,
//!   "extra_home_launchers": ["org.example.launcher"]
//! }
//! ```
//!
//! Every field is optional. The `directories` crate resolves both the config
//! file location and the default data directory.

use crate::store::DataStore;
use crate::usage::Clock;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Persisted engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Package id of the tracking app itself; never counted or ranked
    pub self_package: String,
    /// Where `store.json` lives; the platform data directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Coalescing window for persistence writes
    pub write_debounce_ms: u64,
    /// Lifetime of the document read cache
    pub cache_ttl_ms: u64,
    /// Minimum time between two decays
    pub decay_interval_days: u64,
    /// Launches of the same app closer together than this count once
    pub burst_window_ms: u64,
    /// Minimum gap between two widget refresh broadcasts
    pub refresh_interval_ms: u64,
    /// Package ids treated as home launchers in addition to the built-in ones
    pub extra_home_launchers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            self_package: "dev.launchrank".to_string(),
            data_dir: None,
            write_debounce_ms: 1_000,
            cache_ttl_ms: 1_000,
            decay_interval_days: 7,
            burst_window_ms: 500,
            refresh_interval_ms: 10_000,
            extra_home_launchers: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from disk. Returns `EngineConfig::default()` if the
    /// file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::try_load().unwrap_or_else(|e| {
            log::warn!("Using default configuration: {:#}", e);
            Self::default()
        })
    }

    fn try_load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path. Returns the defaults if the
    /// file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save the configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.json"))
    }

    /// The configured data directory, or the platform default
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }

    /// Open the document store this configuration describes
    pub fn open_store(&self, clock: Arc<dyn Clock>) -> Result<DataStore> {
        let store = DataStore::open(self.resolve_data_dir()?, clock)?
            .with_cache_ttl_ms(clamp_i64(self.cache_ttl_ms))
            .with_decay_interval_days(clamp_i64(self.decay_interval_days));
        Ok(store)
    }

    pub fn write_debounce(&self) -> Duration {
        Duration::from_millis(self.write_debounce_ms)
    }

    pub fn refresh_interval_ms(&self) -> i64 {
        clamp_i64(self.refresh_interval_ms)
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "launchrank")
        .context("Could not determine application directories")
}
