//! Runtime configuration for the discovery engine.
//!
//! Loaded from `~/.benchmate/config.toml`. Every field has a default so a
//! missing file yields a fully usable configuration; a malformed file is
//! reported to the caller, which should warn and fall back to defaults.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::storage::StorageConfig;

fn default_refresh_interval_secs() -> u64 {
    10
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_max_recent_projects() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Seconds between background discovery cycles.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Upper bound on a single endpoint probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Maximum number of persisted recent-project entries.
    #[serde(default = "default_max_recent_projects")]
    pub max_recent_projects: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_recent_projects: default_max_recent_projects(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl RuntimeConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.refresh_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.probe_timeout_ms)
    }
}

/// Loads the runtime config from the given path, or from the default
/// location when `None`. A missing file is not an error; a malformed one is.
pub fn load_runtime_config(path: Option<&Path>) -> Result<RuntimeConfig, String> {
    let default_path;
    let path = match path {
        Some(path) => path,
        None => {
            default_path = StorageConfig::default().config_file();
            &default_path
        }
    };

    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }

    let raw = fs_err::read_to_string(path)
        .map_err(|err| format!("Failed to read config {}: {}", path.display(), err))?;
    toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config {}: {}", path.display(), err))
}
