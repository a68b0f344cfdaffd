//! Configuration loading and saving.
//!
//! The config file is optional. A missing or malformed file yields defaults
//! that match the lock protocol's standard timings.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RecommenderError, Result};
use crate::lock::LockTimings;
use crate::storage::{StoragePaths, DEFAULT_DIR_NAME};
use crate::store::StoreOptions;

pub const CONFIG_FILENAME: &str = "config.json";

/// User-tunable settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Overrides the platform data directory.
    pub storage_dir: Option<PathBuf>,
    /// Overrides the per-user log directory. Logs never go in the shared
    /// storage directory.
    pub log_dir: Option<PathBuf>,
    pub acquire_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    /// Delay before the startup pass prompts, so other tools can load first.
    pub startup_delay_ms: u64,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        RecommenderConfig {
            storage_dir: None,
            log_dir: None,
            acquire_timeout_secs: 15,
            stale_after_secs: 30,
            poll_interval_ms: 25,
            settle_delay_ms: 100,
            startup_delay_ms: 6_000,
        }
    }
}

impl RecommenderConfig {
    pub fn lock_timings(&self) -> LockTimings {
        LockTimings {
            stale_after: Duration::from_secs(self.stale_after_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            lock: self.lock_timings(),
        }
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// The configured storage directory, or the platform default.
    pub fn storage_paths(&self) -> Result<StoragePaths> {
        match &self.storage_dir {
            Some(dir) => Ok(StoragePaths::with_root(dir)),
            None => StoragePaths::platform_default(),
        }
    }

    /// Where front-ends write log files: the configured directory, else
    /// `<state_dir or cache_dir>/extension-recommender/logs`.
    pub fn log_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.log_dir {
            return Some(dir.clone());
        }
        dirs::state_dir()
            .or_else(dirs::cache_dir)
            .map(|d| d.join(DEFAULT_DIR_NAME).join("logs"))
    }
}

/// Returns the path to the config file (`<config_dir>/extension-recommender/config.json`).
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(DEFAULT_DIR_NAME).join(CONFIG_FILENAME))
}

/// Loads the config from its default location, returning defaults if absent.
pub fn load_config() -> RecommenderConfig {
    get_config_path()
        .map(|p| load_config_from(&p))
        .unwrap_or_default()
}

/// Loads the config at `path`, returning defaults if it is missing or malformed.
pub fn load_config_from(path: &Path) -> RecommenderConfig {
    let Ok(content) = fs::read_to_string(path) else {
        return RecommenderConfig::default();
    };
    match parse_config(path, &content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed config, using defaults");
            RecommenderConfig::default()
        }
    }
}

fn parse_config(path: &Path, content: &str) -> Result<RecommenderConfig> {
    serde_json::from_str(content).map_err(|e| RecommenderError::ConfigMalformed {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

/// Saves the config to `path`, creating parent directories as needed.
pub fn save_config_to(path: &Path, config: &RecommenderConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config).map_err(|e| RecommenderError::Json {
        context: "serializing config".to_string(),
        source: e,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RecommenderError::ConfigWriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| RecommenderError::ConfigWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}
