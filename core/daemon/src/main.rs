//! Benchmate daemon entrypoint.
//!
//! A small local service that owns the discovery engine: it runs the
//! background refresh scheduler, is the single writer of the recent-projects
//! store, and serves the reconciled projects view to presentation layers
//! over a Unix socket speaking newline-delimited JSON.

use clap::Parser;
use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use benchmate_core::{
    load_runtime_config, CoreError, EndpointDirs, RecencyStore, RefreshScheduler, RuntimeConfig,
    SchedulerConfig, StorageConfig,
};
use benchmate_daemon_protocol::{
    parse_project_path, ErrorInfo, Method, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

const SOCKET_ENV: &str = "BENCHMATE_DAEMON_SOCKET";
const DEBUG_LOG_ENV: &str = "BENCHMATE_DEBUG_LOG";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

#[derive(Parser)]
#[command(name = "benchmate-daemon")]
#[command(about = "Benchmate instance discovery daemon")]
#[command(version)]
struct Cli {
    /// Socket path for the daemon RPC endpoint
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Directory scanned for KiCad endpoint sockets, replacing the defaults
    #[arg(long)]
    endpoint_dir: Option<PathBuf>,

    /// Seconds between background discovery cycles
    #[arg(long)]
    refresh_interval_secs: Option<u64>,

    /// Upper bound on a single endpoint probe, in milliseconds
    #[arg(long)]
    probe_timeout_ms: Option<u64>,
}

struct SharedState {
    scheduler: RefreshScheduler,
    store: Arc<RecencyStore>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let storage = StorageConfig::default();
    if let Err(err) = storage.ensure_dirs() {
        error!(error = %err, "Failed to create data directory");
        std::process::exit(1);
    }

    let mut runtime_config = match load_runtime_config(Some(&storage.config_file())) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load runtime config; using defaults");
            RuntimeConfig::default()
        }
    };
    if let Some(secs) = cli.refresh_interval_secs {
        runtime_config.discovery.refresh_interval_secs = secs;
    }
    if let Some(ms) = cli.probe_timeout_ms {
        runtime_config.discovery.probe_timeout_ms = ms;
    }

    let socket_path = cli
        .socket
        .unwrap_or_else(|| daemon_socket_path(&storage));

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }
    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    let endpoint_dirs = match cli.endpoint_dir {
        Some(dir) => EndpointDirs::with_dirs(vec![dir]),
        None => EndpointDirs::resolve(),
    };
    let store = Arc::new(RecencyStore::load(
        &storage.recent_projects_file(),
        runtime_config.discovery.max_recent_projects,
    ));
    let scheduler = RefreshScheduler::start(
        SchedulerConfig::from(&runtime_config),
        endpoint_dirs,
        Arc::clone(&store),
    );

    info!(path = %socket_path.display(), "Benchmate daemon started");

    let state = Arc::new(SharedState { scheduler, store });

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&state);
                thread::spawn(|| handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = env::var(DEBUG_LOG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn daemon_socket_path(storage: &StorageConfig) -> PathBuf {
    match env::var(SOCKET_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => storage.daemon_socket_file(),
    }
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<SharedState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(&response)?;
    payload.push(b'\n');
    stream.write_all(&payload)?;
    stream.flush()
}

fn handle_request(request: Request, state: &SharedState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => {
            let view = state.scheduler.snapshot();
            let data = serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "cycles_completed": state.scheduler.cycles_completed(),
                "refreshed_at": view.refreshed_at.clone(),
            });
            Response::ok(request.id, data)
        }
        Method::GetProjects => {
            let view = state.scheduler.snapshot();
            tracing::debug!(
                open = view.open.len(),
                recent = view.recent.len(),
                "Projects view snapshot"
            );
            match serde_json::to_value(view.as_ref()) {
                Ok(value) => Response::ok(request.id, value),
                Err(err) => Response::error(
                    request.id,
                    "serialization_error",
                    format!("Failed to serialize projects view: {}", err),
                ),
            }
        }
        Method::RefreshProjects => {
            state.scheduler.refresh_now();
            Response::ok(request.id, serde_json::json!({ "requested": true }))
        }
        Method::AddRecentProject => {
            let path = match require_project_path(request.params) {
                Ok(path) => path,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match state.store.add(&path) {
                Ok(entry) => match serde_json::to_value(&entry) {
                    Ok(value) => Response::ok(request.id, value),
                    Err(err) => Response::error(
                        request.id,
                        "serialization_error",
                        format!("Failed to serialize entry: {}", err),
                    ),
                },
                Err(err) => Response::error_with_info(request.id, store_error(err)),
            }
        }
        Method::RemoveRecentProject => {
            let path = match require_project_path(request.params) {
                Ok(path) => path,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match state.store.remove(&path) {
                Ok(()) => Response::ok(request.id, serde_json::json!({ "removed": true })),
                Err(err) => Response::error_with_info(request.id, store_error(err)),
            }
        }
    }
}

fn require_project_path(params: Option<serde_json::Value>) -> Result<String, ErrorInfo> {
    let params = params.ok_or_else(|| ErrorInfo::new("invalid_params", "path is required"))?;
    parse_project_path(params)
}

fn store_error(err: CoreError) -> ErrorInfo {
    match &err {
        CoreError::InvalidProjectPath { .. } => ErrorInfo::new("invalid_path", err.to_string()),
        _ => ErrorInfo::new("store_error", err.to_string()),
    }
}
