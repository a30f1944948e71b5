//! Storage configuration and path management for Benchmate.
//!
//! Centralizes every file path under `~/.benchmate/` so path decisions live
//! in one place and tests can inject a temp root via
//! [`StorageConfig::with_root`].

use std::path::{Path, PathBuf};

/// Central configuration for all Benchmate storage paths.
///
/// Production code uses `StorageConfig::default()` which points to
/// `~/.benchmate/`. Tests use `StorageConfig::with_root(temp_dir)` for
/// isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all Benchmate data (default: ~/.benchmate)
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        Self {
            root: home.join(".benchmate"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory for Benchmate data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to recent-projects.json (persisted project history).
    pub fn recent_projects_file(&self) -> PathBuf {
        self.root.join("recent-projects.json")
    }

    /// Path to the daemon's RPC socket.
    pub fn daemon_socket_file(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    /// Path to config.toml (runtime configuration).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Ensures the root directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}
