//! Error types for benchmate-core operations.
//!
//! Routine discovery failures (unreachable endpoints, timeouts, empty
//! directories) are modeled as values, not errors; this enum covers the
//! caller-facing and I/O failures only.

use std::path::PathBuf;

/// All errors that can occur in benchmate-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid project path: {path}: {reason}")]
    InvalidProjectPath { path: String, reason: String },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

// Conversion for string error compatibility at IPC boundaries
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
