//! Endpoint liveness probing and metadata extraction.
//!
//! A probe is one bounded request/reply exchange against a candidate socket:
//! say hello, receive the instance's version and open documents, classify
//! the outcome. Unreachable and timed-out endpoints are routine results
//! (a stale socket file with no process behind it is the common case), so
//! they are values here, never errors.
//!
//! The exchange uses newline-delimited JSON. The real CAD wire format is
//! out of scope for this engine; these types are the minimal contract the
//! prober needs, and tests stand up fake endpoints speaking the same frames.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::paths::display_name_from_path;
use crate::retry::CancelToken;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);
const PROBE_CLIENT_NAME: &str = "benchmate-probe";
/// Reads poll in slices this long so cancellation never waits out a full
/// probe timeout.
const READ_SLICE: Duration = Duration::from_millis(25);
const READ_CHUNK_SIZE: usize = 4096;
const MAX_REPLY_BYTES: usize = 64 * 1024;

/// First frame sent to a candidate endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointHello {
    pub client_name: String,
}

/// One document the instance currently has open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenDocument {
    pub project_path: String,
}

/// Reply frame: version plus the currently open documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub version: String,
    #[serde(default)]
    pub open_documents: Vec<OpenDocument>,
}

/// A successfully probed, currently reachable instance.
///
/// Exists only for the cycle that probed it; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveInstance {
    pub endpoint: String,
    pub version: String,
    /// `None` when the instance is running with nothing open - a valid,
    /// common state distinct from "not running at all".
    pub project_path: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Alive(LiveInstance),
    Unreachable,
    TimedOut,
}

impl LiveInstance {
    fn from_info(socket_path: &Path, info: EndpointInfo) -> Self {
        // Multiple open documents: the first one returned wins. The endpoint's
        // ordering is not assumed to be meaningful, only consistent.
        let project_path = info
            .open_documents
            .first()
            .map(|doc| doc.project_path.trim().to_string())
            .filter(|path| !path.is_empty());

        let display_name = match &project_path {
            Some(path) => format!(
                "{} (KiCad {})",
                display_name_from_path(path),
                info.version
            ),
            None => format!("KiCad {}", info.version),
        };

        Self {
            endpoint: socket_path.to_string_lossy().to_string(),
            version: info.version,
            project_path,
            display_name,
        }
    }
}

/// Probes a single candidate endpoint within `timeout`.
///
/// Classification:
/// - connect failure or malformed reply: [`ProbeOutcome::Unreachable`]
/// - deadline expiry at any phase, or cancellation: [`ProbeOutcome::TimedOut`]
/// - a well-formed reply: [`ProbeOutcome::Alive`], with `project_path: None`
///   when the instance reports zero open documents
pub fn probe_endpoint(
    socket_path: &Path,
    timeout: Duration,
    cancel: &CancelToken,
) -> ProbeOutcome {
    let deadline = Instant::now() + timeout;

    let mut stream = match UnixStream::connect(socket_path) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::debug!(
                path = %socket_path.display(),
                error = %err,
                "Endpoint connect failed"
            );
            return ProbeOutcome::Unreachable;
        }
    };

    if let Err(outcome) = send_hello(&mut stream, deadline) {
        return outcome;
    }

    match read_info(&mut stream, deadline, cancel) {
        Ok(info) => ProbeOutcome::Alive(LiveInstance::from_info(socket_path, info)),
        Err(outcome) => outcome,
    }
}

fn remaining_until(deadline: Instant) -> Option<Duration> {
    deadline.checked_duration_since(Instant::now())
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn send_hello(stream: &mut UnixStream, deadline: Instant) -> Result<(), ProbeOutcome> {
    let Some(remaining) = remaining_until(deadline) else {
        return Err(ProbeOutcome::TimedOut);
    };
    let _ = stream.set_write_timeout(Some(remaining.max(Duration::from_millis(1))));

    let hello = EndpointHello {
        client_name: PROBE_CLIENT_NAME.to_string(),
    };
    let mut payload = serde_json::to_vec(&hello).map_err(|_| ProbeOutcome::Unreachable)?;
    payload.push(b'\n');

    match stream.write_all(&payload) {
        Ok(()) => {
            stream.flush().ok();
            Ok(())
        }
        Err(err) if is_timeout(&err) => Err(ProbeOutcome::TimedOut),
        Err(_) => Err(ProbeOutcome::Unreachable),
    }
}

fn read_info(
    stream: &mut UnixStream,
    deadline: Instant,
    cancel: &CancelToken,
) -> Result<EndpointInfo, ProbeOutcome> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(ProbeOutcome::TimedOut);
        }
        let Some(remaining) = remaining_until(deadline) else {
            return Err(ProbeOutcome::TimedOut);
        };

        let slice = READ_SLICE.min(remaining).max(Duration::from_millis(1));
        let _ = stream.set_read_timeout(Some(slice));

        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REPLY_BYTES {
                    return Err(ProbeOutcome::Unreachable);
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            // Poll slice expired; loop around to re-check deadline and cancel.
            Err(err) if is_timeout(&err) => continue,
            Err(_) => return Err(ProbeOutcome::Unreachable),
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let reply_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if reply_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ProbeOutcome::Unreachable);
    }

    serde_json::from_slice(reply_bytes).map_err(|_| ProbeOutcome::Unreachable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::os::unix::net::UnixListener;
    use std::thread;
    use tempfile::TempDir;

    /// Binds a fake endpoint that answers every connection with `info`.
    fn spawn_endpoint(socket_path: &Path, info: EndpointInfo) -> thread::JoinHandle<()> {
        let listener = UnixListener::bind(socket_path).expect("bind fake endpoint");
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let mut reader = io::BufReader::new(&stream);
                let mut request = String::new();
                let _ = reader.read_line(&mut request);

                let mut payload = serde_json::to_vec(&info).expect("serialize info");
                payload.push(b'\n');
                let _ = (&stream).write_all(&payload);
            }
        })
    }

    /// Binds a fake endpoint that accepts connections but never replies.
    fn spawn_silent_endpoint(socket_path: &Path) -> thread::JoinHandle<()> {
        let listener = UnixListener::bind(socket_path).expect("bind silent endpoint");
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                // Hold the connection open long enough for any probe to give up.
                thread::sleep(Duration::from_secs(5));
                drop(stream);
            }
        })
    }

    fn info(version: &str, docs: &[&str]) -> EndpointInfo {
        EndpointInfo {
            version: version.to_string(),
            open_documents: docs
                .iter()
                .map(|path| OpenDocument {
                    project_path: path.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn probes_instance_with_open_project() {
        let temp = TempDir::new().unwrap();
        let socket = temp.path().join("api.sock");
        let server = spawn_endpoint(&socket, info("9.0.1", &["/projects/amp/amp.kicad_pro"]));

        let outcome = probe_endpoint(&socket, DEFAULT_PROBE_TIMEOUT, &CancelToken::new());
        server.join().unwrap();

        let ProbeOutcome::Alive(instance) = outcome else {
            panic!("expected Alive, got {:?}", outcome);
        };
        assert_eq!(instance.version, "9.0.1");
        assert_eq!(
            instance.project_path.as_deref(),
            Some("/projects/amp/amp.kicad_pro")
        );
        assert_eq!(instance.display_name, "amp (KiCad 9.0.1)");
    }

    #[test]
    fn instance_with_nothing_open_is_alive_without_project() {
        let temp = TempDir::new().unwrap();
        let socket = temp.path().join("api.sock");
        let server = spawn_endpoint(&socket, info("9.0.1", &[]));

        let outcome = probe_endpoint(&socket, DEFAULT_PROBE_TIMEOUT, &CancelToken::new());
        server.join().unwrap();

        let ProbeOutcome::Alive(instance) = outcome else {
            panic!("expected Alive, got {:?}", outcome);
        };
        assert!(instance.project_path.is_none());
        assert_eq!(instance.display_name, "KiCad 9.0.1");
    }

    #[test]
    fn first_document_determines_the_project() {
        let temp = TempDir::new().unwrap();
        let socket = temp.path().join("api.sock");
        let server = spawn_endpoint(
            &socket,
            info("9.0.1", &["/projects/amp/amp.kicad_pro", "/projects/psu/psu.kicad_pro"]),
        );

        let outcome = probe_endpoint(&socket, DEFAULT_PROBE_TIMEOUT, &CancelToken::new());
        server.join().unwrap();

        let ProbeOutcome::Alive(instance) = outcome else {
            panic!("expected Alive, got {:?}", outcome);
        };
        assert_eq!(
            instance.project_path.as_deref(),
            Some("/projects/amp/amp.kicad_pro")
        );
    }

    #[test]
    fn stale_socket_file_is_unreachable() {
        let temp = TempDir::new().unwrap();
        let socket = temp.path().join("api.sock");
        std::fs::write(&socket, b"").unwrap();

        let outcome = probe_endpoint(&socket, DEFAULT_PROBE_TIMEOUT, &CancelToken::new());
        assert_eq!(outcome, ProbeOutcome::Unreachable);
    }

    #[test]
    fn missing_socket_is_unreachable() {
        let temp = TempDir::new().unwrap();
        let outcome = probe_endpoint(
            &temp.path().join("api.sock"),
            DEFAULT_PROBE_TIMEOUT,
            &CancelToken::new(),
        );
        assert_eq!(outcome, ProbeOutcome::Unreachable);
    }

    #[test]
    fn malformed_reply_is_unreachable() {
        let temp = TempDir::new().unwrap();
        let socket = temp.path().join("api.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.write_all(b"not json at all\n");
            }
        });

        let outcome = probe_endpoint(&socket, DEFAULT_PROBE_TIMEOUT, &CancelToken::new());
        server.join().unwrap();
        assert_eq!(outcome, ProbeOutcome::Unreachable);
    }

    #[test]
    fn silent_endpoint_times_out_within_budget() {
        let temp = TempDir::new().unwrap();
        let socket = temp.path().join("api.sock");
        let _server = spawn_silent_endpoint(&socket);

        let start = Instant::now();
        let outcome = probe_endpoint(&socket, Duration::from_millis(50), &CancelToken::new());
        let elapsed = start.elapsed();

        assert_eq!(outcome, ProbeOutcome::TimedOut);
        assert!(
            elapsed < Duration::from_millis(150),
            "probe took {:?}, expected to stay near the 50ms budget",
            elapsed
        );
    }

    #[test]
    fn cancellation_interrupts_a_probe_before_its_timeout() {
        let temp = TempDir::new().unwrap();
        let socket = temp.path().join("api.sock");
        let _server = spawn_silent_endpoint(&socket);

        let cancel = CancelToken::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                cancel.cancel();
            })
        };

        let start = Instant::now();
        let outcome = probe_endpoint(&socket, Duration::from_secs(2), &cancel);
        canceller.join().unwrap();

        assert_eq!(outcome, ProbeOutcome::TimedOut);
        assert!(
            start.elapsed() < Duration::from_millis(500),
            "cancelled probe should not wait out its full timeout"
        );
    }
}
