//! Client helpers for presentation layers talking to benchmate-daemon.
//!
//! The daemon is the single writer of discovery state; this crate only
//! sends requests and parses replies. Failures are surfaced to the caller
//! as strings - the UI decides how to render them.
//!
//! A UI that starts the daemon itself should call [`wait_for_daemon`]
//! before its first real request: it retries the health check with bounded
//! backoff and honors a cancellation token, instead of sleeping a fixed
//! number of times and hoping.

use benchmate_core::retry::{retry_with_backoff, CancelToken, RetryError, RetryPolicy};
use benchmate_daemon_protocol::{
    Method, ProjectsView, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use chrono::Utc;
use rand::RngCore;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

pub const SOCKET_ENV: &str = "BENCHMATE_DAEMON_SOCKET";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_MS: u64 = 600;
const WRITE_TIMEOUT_MS: u64 = 600;

/// Fetches the current reconciled projects view.
pub fn fetch_projects() -> Result<ProjectsView, String> {
    let response = send_request(build_request(Method::GetProjects, None))?;
    let data = expect_ok(response)?
        .ok_or_else(|| "Projects response carried no data".to_string())?;

    let view: ProjectsView = serde_json::from_value(data)
        .map_err(|err| format!("Failed to parse projects view: {}", err))?;
    view.validate()
        .map_err(|err| format!("{}: {}", err.code, err.message))?;
    Ok(view)
}

/// Requests an out-of-band discovery cycle.
pub fn refresh_now() -> Result<(), String> {
    let response = send_request(build_request(Method::RefreshProjects, None))?;
    expect_ok(response).map(|_| ())
}

/// Records a project path in the recent list (typically after the user
/// opened or browsed to it).
pub fn add_recent_project(path: &str) -> Result<(), String> {
    let params = serde_json::json!({ "path": path });
    let response = send_request(build_request(Method::AddRecentProject, Some(params)))?;
    expect_ok(response).map(|_| ())
}

/// Removes a project path from the recent list.
pub fn remove_recent_project(path: &str) -> Result<(), String> {
    let params = serde_json::json!({ "path": path });
    let response = send_request(build_request(Method::RemoveRecentProject, Some(params)))?;
    expect_ok(response).map(|_| ())
}

/// Returns `Some(true)` when the daemon answers its health check,
/// `Some(false)` on an unhealthy answer, `None` when it cannot be reached.
pub fn daemon_health() -> Option<bool> {
    let response = send_request(build_request(Method::GetHealth, None)).ok()?;
    if !response.ok {
        return Some(false);
    }

    let status = response
        .data
        .as_ref()
        .and_then(|data| data.get("status"))
        .and_then(|value| value.as_str());

    Some(matches!(status, Some("ok")))
}

/// Blocks until the daemon answers its health check, retrying with backoff.
///
/// Returns an error when the policy is exhausted or `cancel` fires.
pub fn wait_for_daemon(policy: &RetryPolicy, cancel: &CancelToken) -> Result<(), String> {
    retry_with_backoff(policy, cancel, |attempt| {
        tracing::debug!(attempt, "Waiting for daemon health");
        match daemon_health() {
            Some(true) => Ok(()),
            Some(false) => Err("daemon reported unhealthy".to_string()),
            None => Err("daemon socket not reachable".to_string()),
        }
    })
    .map_err(|err| match err {
        RetryError::Cancelled => "cancelled while waiting for daemon".to_string(),
        RetryError::Exhausted { attempts, last } => {
            format!("daemon not ready after {} attempts: {}", attempts, last)
        }
    })
}

fn build_request(method: Method, params: Option<serde_json::Value>) -> Request {
    Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(make_request_id()),
        params,
    }
}

fn expect_ok(response: Response) -> Result<Option<serde_json::Value>, String> {
    if response.ok {
        Ok(response.data)
    } else {
        let message = response
            .error
            .map(|err| format!("{}: {}", err.code, err.message))
            .unwrap_or_else(|| "Unknown daemon error".to_string());
        Err(message)
    }
}

fn socket_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".benchmate").join(SOCKET_NAME))
}

fn send_request(request: Request) -> Result<Response, String> {
    let socket = socket_path()?;
    let mut stream = UnixStream::connect(&socket)
        .map_err(|err| format!("Failed to connect to daemon socket: {}", err))?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    serde_json::to_writer(&mut stream, &request)
        .map_err(|err| format!("Failed to write request: {}", err))?;
    stream
        .write_all(b"\n")
        .map_err(|err| format!("Failed to flush request: {}", err))?;
    stream.flush().ok();

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err("Response exceeded maximum size".to_string());
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                return Err("Timed out waiting for daemon response".to_string());
            }
            Err(err) => return Err(format!("Failed to read response: {}", err)),
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err("Daemon response was empty".to_string());
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| format!("Failed to parse response JSON: {}", err))
}

fn make_request_id() -> String {
    let mut random = rand::thread_rng();
    let rand = random.next_u64();
    format!("req-{}-{:x}", Utc::now().timestamp_millis(), rand)
}
