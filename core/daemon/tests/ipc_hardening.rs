use benchmate_daemon_protocol::{Method, Request, Response, PROTOCOL_VERSION};
use serde_json::json;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path, endpoint_dir: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_benchmate-daemon"))
        .env("HOME", home)
        .env("BENCHMATE_ENDPOINT_DIR", endpoint_dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn benchmate-daemon")
}

fn socket_path(home: &Path) -> PathBuf {
    home.join(".benchmate").join("daemon.sock")
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn send_raw(socket: &Path, payload: &[u8]) -> Response {
    let mut stream = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
    stream.write_all(payload).expect("Failed to write payload");
    stream.flush().ok();
    read_response(&mut stream)
}

fn send_request(socket: &Path, request: &Request) -> Response {
    let mut payload = serde_json::to_vec(request).expect("serialize request");
    payload.push(b'\n');
    send_raw(socket, &payload)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("Failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("Failed to parse response JSON")
}

fn error_code(response: &Response) -> String {
    response
        .error
        .as_ref()
        .map(|err| err.code.clone())
        .unwrap_or_default()
}

#[test]
fn daemon_rejects_malformed_and_hostile_requests() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let endpoint_dir = home.path().join("endpoints");
    std::fs::create_dir_all(&endpoint_dir).expect("create endpoint dir");

    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path(), &endpoint_dir);
    let _guard = DaemonGuard { child };
    wait_for_socket(&socket, Duration::from_secs(2));

    let response = send_raw(&socket, b"this is not json\n");
    assert!(!response.ok);
    assert_eq!(error_code(&response), "invalid_json");

    let response = send_raw(&socket, b"   \n");
    assert!(!response.ok);
    assert_eq!(error_code(&response), "empty_request");

    let response = send_raw(
        &socket,
        br#"{"protocol_version":1,"method":"get_everything"}
"#,
    );
    assert!(!response.ok);
    assert_eq!(error_code(&response), "invalid_json");

    let response = send_request(
        &socket,
        &Request {
            protocol_version: 99,
            method: Method::GetHealth,
            id: Some("mismatch".to_string()),
            params: None,
        },
    );
    assert!(!response.ok);
    assert_eq!(error_code(&response), "protocol_mismatch");

    let mut oversized = Vec::new();
    oversized.extend_from_slice(br#"{"protocol_version":1,"method":"get_health","id":""#);
    oversized.extend(std::iter::repeat(b'a').take(70 * 1024));
    oversized.extend_from_slice(b"\"}\n");
    let response = send_raw(&socket, &oversized);
    assert!(!response.ok);
    assert_eq!(error_code(&response), "request_too_large");

    // The daemon keeps serving after every rejection.
    let health = send_request(
        &socket,
        &Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::GetHealth,
            id: Some("still-alive".to_string()),
            params: None,
        },
    );
    assert!(health.ok);
}

#[test]
fn malformed_project_paths_are_errors_not_crashes() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let endpoint_dir = home.path().join("endpoints");
    std::fs::create_dir_all(&endpoint_dir).expect("create endpoint dir");

    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path(), &endpoint_dir);
    let _guard = DaemonGuard { child };
    wait_for_socket(&socket, Duration::from_secs(2));

    let response = send_request(
        &socket,
        &Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::AddRecentProject,
            id: Some("add-missing-params".to_string()),
            params: None,
        },
    );
    assert!(!response.ok);
    assert_eq!(error_code(&response), "invalid_params");

    let response = send_request(
        &socket,
        &Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::AddRecentProject,
            id: Some("add-relative".to_string()),
            params: Some(json!({"path": "projects/amp"})),
        },
    );
    assert!(!response.ok);
    assert_eq!(error_code(&response), "invalid_path");

    let response = send_request(
        &socket,
        &Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::AddRecentProject,
            id: Some("add-empty".to_string()),
            params: Some(json!({"path": "   "})),
        },
    );
    assert!(!response.ok);
    assert_eq!(error_code(&response), "invalid_path");

    // Removing something that was never added is a quiet no-op.
    let response = send_request(
        &socket,
        &Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::RemoveRecentProject,
            id: Some("remove-absent".to_string()),
            params: Some(json!({"path": "/proj/never-added"})),
        },
    );
    assert!(response.ok);

    let health = send_request(
        &socket,
        &Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::GetHealth,
            id: Some("still-alive".to_string()),
            params: None,
        },
    );
    assert!(health.ok);
}
