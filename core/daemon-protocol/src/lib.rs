//! IPC protocol types and validation for benchmate-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024; // 64KB
pub const MAX_PROJECT_PATH_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    GetProjects,
    RefreshProjects,
    AddRecentProject,
    RemoveRecentProject,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// One reachable KiCad instance in the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenProject {
    pub endpoint: String,
    pub version: String,
    #[serde(default)]
    pub project_path: Option<String>,
    pub display_name: String,
}

/// One persisted recent-project entry, flagged when a live instance has it open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentProject {
    pub path: String,
    pub name: String,
    pub last_opened: String,
    pub is_open: bool,
}

/// The unified snapshot served to presentation layers.
///
/// `refreshed_at` is `None` until the first discovery cycle completes; the
/// lists are then replaced wholesale on every subsequent cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsView {
    pub open: Vec<OpenProject>,
    pub recent: Vec<RecentProject>,
    #[serde(default)]
    pub refreshed_at: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectPathParams {
    pub path: String,
}

/// Parses and shape-validates the params for the recent-project mutations.
/// Semantic validation (absolute path, normalization) stays in the store.
pub fn parse_project_path(params: Value) -> Result<String, ErrorInfo> {
    let parsed: ProjectPathParams = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("project path payload is invalid: {}", err),
        )
    })?;

    let path = parsed.path.trim().to_string();
    if path.is_empty() {
        return Err(ErrorInfo::new("invalid_path", "path is required"));
    }
    if path.chars().count() > MAX_PROJECT_PATH_CHARS {
        return Err(ErrorInfo::new(
            "invalid_path",
            format!("path must be {} characters or fewer", MAX_PROJECT_PATH_CHARS),
        ));
    }

    Ok(path)
}

impl ProjectsView {
    /// Validates a view received off the wire before handing it to callers.
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if let Some(refreshed_at) = &self.refreshed_at {
            if DateTime::parse_from_rfc3339(refreshed_at).is_err() {
                return Err(ErrorInfo::new(
                    "invalid_timestamp",
                    "refreshed_at must be RFC3339",
                ));
            }
        }
        for entry in &self.recent {
            if DateTime::parse_from_rfc3339(&entry.last_opened).is_err() {
                return Err(ErrorInfo::new(
                    "invalid_timestamp",
                    format!("last_opened for {} must be RFC3339", entry.path),
                ));
            }
        }
        Ok(())
    }
}
