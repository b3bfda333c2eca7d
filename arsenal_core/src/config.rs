//! Engine configuration.
//!
//! `EngineConfig` is the one knob surface for a deployment: timeouts, cache
//! sizing, and the progress cadence. It deserializes from TOML with every
//! field optional, so a config file only needs to name what it changes.

use crate::constants::{
    DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_SECS, DEFAULT_COMMAND_TIMEOUT_SECS,
    DEFAULT_PROGRESS_INTERVAL_MS,
};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout applied when a caller does not pass one, in seconds.
    pub command_timeout_secs: u64,
    /// Result cache capacity, in entries.
    pub cache_max_entries: usize,
    /// Result cache time-to-live, in seconds.
    pub cache_ttl_secs: u64,
    /// Interval of the progress-estimation task, in milliseconds.
    pub progress_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
