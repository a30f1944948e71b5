//! Candidate endpoint discovery.
//!
//! KiCad places one IPC socket per running instance in a well-known
//! directory: `api.sock` for the first instance, `api-<PID>.sock` for
//! additional ones. Locating candidates is pure directory enumeration;
//! whether anything is listening behind a socket file is the prober's job.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;

/// Overrides the candidate directory list with a single directory.
pub const ENDPOINT_DIR_ENV: &str = "BENCHMATE_ENDPOINT_DIR";

/// `api.sock` or `api-<PID>.sock`; anything else in the directory is not a
/// KiCad endpoint.
static RE_ENDPOINT_SOCKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^api(-\d+)?\.sock$").unwrap());

/// A socket path that may or may not host a live IPC listener.
///
/// Candidates carry no identity beyond their address and are recreated on
/// every discovery cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEndpoint {
    pub socket_path: PathBuf,
    pub discovered_at: DateTime<Utc>,
}

/// The ordered list of directories scanned for endpoint sockets.
#[derive(Debug, Clone)]
pub struct EndpointDirs {
    dirs: Vec<PathBuf>,
}

impl EndpointDirs {
    /// Resolves the directories to scan: the env override wins outright;
    /// otherwise the platform default plus, on Unix, the flatpak sandbox
    /// location as a secondary directory scanned in addition to the primary.
    pub fn resolve() -> Self {
        if let Ok(dir) = env::var(ENDPOINT_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Self {
                    dirs: vec![PathBuf::from(dir)],
                };
            }
        }

        Self {
            dirs: platform_default_dirs(),
        }
    }

    /// Builds an explicit directory list. Used for testing and for the
    /// daemon's `--endpoint-dir` flag.
    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

#[cfg(windows)]
fn platform_default_dirs() -> Vec<PathBuf> {
    let temp = env::var("TEMP").unwrap_or_else(|_| String::from("C:\\Temp"));
    vec![PathBuf::from(temp).join("kicad")]
}

#[cfg(not(windows))]
fn platform_default_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/tmp/kicad")];

    // Flatpak KiCad keeps its tmp inside the sandbox
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".var/app/org.kicad.KiCad/cache/tmp/kicad"));
    }

    dirs
}

/// Enumerates candidate endpoints across the configured directories.
///
/// Missing directories contribute nothing; this never fails. The result is
/// sorted by path and deduplicated so the candidate order is stable from
/// cycle to cycle.
pub fn locate_candidates(dirs: &EndpointDirs) -> Vec<CandidateEndpoint> {
    let mut sockets = BTreeSet::new();

    for dir in dirs.dirs() {
        let entries = match fs_err::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if RE_ENDPOINT_SOCKET.is_match(name) {
                sockets.insert(path);
            }
        }
    }

    let discovered_at = Utc::now();
    sockets
        .into_iter()
        .map(|socket_path| CandidateEndpoint {
            socket_path,
            discovered_at,
        })
        .collect()
}
