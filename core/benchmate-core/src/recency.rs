//! File-backed recent-projects persistence.
//!
//! The store is the single owner of `~/.benchmate/recent-projects.json`.
//! Entries are created only by explicit caller action (open / browse), never
//! by background discovery, and `entries()` is strictly read-only so the
//! refresh cycle cannot contend with caller mutations on the backing file.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": [
//!     { "path": "/projects/amp", "name": "amp", "last_opened": "..." }
//!   ]
//! }
//! ```
//!
//! # Defensive Design
//!
//! A missing, corrupt, or incompatible file loads as an empty store with a
//! warning - history is a convenience, never worth failing startup over.
//! Writes go through temp-file + rename so readers never observe a partial
//! file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::paths::{
    display_name_from_path, normalize_path_for_comparison, normalize_path_for_matching,
};

pub const DEFAULT_MAX_RECENT: usize = 10;

const STORE_VERSION: u32 = 1;

/// A persisted record of a previously used project.
///
/// `path` is stored normalized, so two differently-cased spellings of the
/// same project collapse into one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentProjectEntry {
    pub path: String,
    pub name: String,
    /// RFC3339 timestamp of the most recent add.
    pub last_opened: String,
}

/// The on-disk JSON structure.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    /// Schema version. Only `version == 1` files are loaded.
    version: u32,
    entries: Vec<RecentProjectEntry>,
}

/// Most-recent-first project history, shared between the daemon's request
/// handlers and the refresh scheduler.
pub struct RecencyStore {
    file_path: Option<PathBuf>,
    max_entries: usize,
    entries: Mutex<Vec<RecentProjectEntry>>,
}

impl RecencyStore {
    /// Creates a store with no backing file. Used in tests.
    pub fn new_in_memory() -> Self {
        RecencyStore {
            file_path: None,
            max_entries: DEFAULT_MAX_RECENT,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Loads the store from `file_path`. Missing or unreadable state loads
    /// as empty; this never fails.
    pub fn load(file_path: &Path, max_entries: usize) -> Self {
        let mut entries = match read_store_file(file_path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    path = %file_path.display(),
                    error = %err,
                    "Failed to load recent projects; starting empty"
                );
                Vec::new()
            }
        };
        entries.truncate(max_entries.max(1));

        RecencyStore {
            file_path: Some(file_path.to_path_buf()),
            max_entries: max_entries.max(1),
            entries: Mutex::new(entries),
        }
    }

    /// Adds a project path, or refreshes it if already present.
    ///
    /// The path is normalized first; an existing entry with the same
    /// normalized path moves to the head with a fresh timestamp instead of
    /// duplicating. Path existence is intentionally not checked - a project
    /// on an unplugged drive is still valid history.
    pub fn add(&self, path: &str) -> Result<RecentProjectEntry> {
        let normalized = validate_project_path(path)?;

        let entry = RecentProjectEntry {
            name: display_name_from_path(&normalized),
            path: normalized.clone(),
            last_opened: Utc::now().to_rfc3339(),
        };

        let snapshot = {
            let mut entries = match self.entries.lock() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries.retain(|existing| normalize_path_for_matching(&existing.path) != normalized);
            entries.insert(0, entry.clone());
            entries.truncate(self.max_entries);
            entries.clone()
        };

        self.persist(&snapshot);
        Ok(entry)
    }

    /// Removes a project by normalized path match. Absent paths are a no-op.
    pub fn remove(&self, path: &str) -> Result<()> {
        let normalized = validate_project_path(path)?;

        let snapshot = {
            let mut entries = match self.entries.lock() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            let before = entries.len();
            entries.retain(|existing| normalize_path_for_matching(&existing.path) != normalized);
            if entries.len() == before {
                return Ok(());
            }
            entries.clone()
        };

        self.persist(&snapshot);
        Ok(())
    }

    /// Returns the entries, most-recent-first. Read-only: never touches the
    /// backing file.
    pub fn entries(&self) -> Vec<RecentProjectEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn persist(&self, entries: &[RecentProjectEntry]) {
        let Some(path) = &self.file_path else {
            return;
        };

        if let Err(err) = write_store_file(path, entries) {
            // Degraded mode: keep serving the in-memory list.
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "Failed to persist recent projects"
            );
        }
    }
}

/// Validates and normalizes a caller-supplied project path.
fn validate_project_path(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidProjectPath {
            path: path.to_string(),
            reason: "path is empty".to_string(),
        });
    }
    if !Path::new(trimmed).is_absolute() {
        return Err(CoreError::InvalidProjectPath {
            path: path.to_string(),
            reason: "path must be absolute".to_string(),
        });
    }

    // Caller-supplied paths get the full treatment (symlink resolution when
    // the path exists); cycle-time matching sticks to the cheap variant.
    Ok(normalize_path_for_comparison(trimmed))
}

fn read_store_file(path: &Path) -> std::result::Result<Vec<RecentProjectEntry>, String> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(format!("failed to read store: {}", err)),
    };

    let store: StoreFile =
        serde_json::from_slice(&data).map_err(|err| format!("failed to parse store: {}", err))?;

    if store.version != STORE_VERSION {
        return Err(format!("unsupported store version {}", store.version));
    }

    Ok(store.entries)
}

fn write_store_file(path: &Path, entries: &[RecentProjectEntry]) -> std::result::Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create store directory: {}", err))?;
    }

    let store = StoreFile {
        version: STORE_VERSION,
        entries: entries.to_vec(),
    };
    let payload = serde_json::to_vec_pretty(&store)
        .map_err(|err| format!("failed to serialize store: {}", err))?;

    let tmp_path = path.with_extension("tmp");
    let mut file =
        fs::File::create(&tmp_path).map_err(|err| format!("failed to write store: {}", err))?;
    file.write_all(&payload)
        .map_err(|err| format!("failed to write store: {}", err))?;
    file.flush().ok();
    drop(file);
    fs::rename(&tmp_path, path).map_err(|err| format!("failed to commit store: {}", err))?;
    Ok(())
}
