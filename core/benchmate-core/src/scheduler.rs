//! Background refresh loop: locate -> probe fan-out -> reconcile -> publish.
//!
//! One thread owns the cycle; candidates are probed on short-lived worker
//! threads and collected in completion order. The published view is swapped
//! wholesale behind a mutex-guarded `Arc`, so readers always see either the
//! prior complete snapshot or the new one, never a partial update.
//!
//! State machine: Idle -> Cycling -> Idle, with `refresh_now` requests
//! collapsing into a single pending flag (the loop thread is the only thing
//! that runs cycles, so two cycles can never overlap), and any state ->
//! Stopped on `stop()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use benchmate_daemon_protocol::ProjectsView;
use chrono::Utc;

use crate::config::RuntimeConfig;
use crate::locator::{locate_candidates, CandidateEndpoint, EndpointDirs};
use crate::probe::{probe_endpoint, LiveInstance, ProbeOutcome, DEFAULT_PROBE_TIMEOUT};
use crate::recency::RecencyStore;
use crate::reconcile::reconcile;
use crate::retry::CancelToken;

/// Slack on top of the per-probe timeout when draining fan-out results.
const COLLECT_SLACK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub refresh_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(10),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl From<&RuntimeConfig> for SchedulerConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            probe_timeout: config.probe_timeout(),
        }
    }
}

struct ControlState {
    refresh_requested: bool,
}

struct SchedulerInner {
    config: SchedulerConfig,
    dirs: EndpointDirs,
    store: Arc<RecencyStore>,
    snapshot: Mutex<Arc<ProjectsView>>,
    control: Mutex<ControlState>,
    wakeup: Condvar,
    cancel: CancelToken,
    cycles_completed: AtomicU64,
}

/// Owns the background refresh thread and the current projects view.
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Starts the loop; the first cycle begins immediately.
    pub fn start(config: SchedulerConfig, dirs: EndpointDirs, store: Arc<RecencyStore>) -> Self {
        let inner = Arc::new(SchedulerInner {
            config,
            dirs,
            store,
            snapshot: Mutex::new(Arc::new(ProjectsView::default())),
            control: Mutex::new(ControlState {
                refresh_requested: false,
            }),
            wakeup: Condvar::new(),
            cancel: CancelToken::new(),
            cycles_completed: AtomicU64::new(0),
        });

        let handle = {
            let inner = Arc::clone(&inner);
            thread::spawn(move || run_loop(inner))
        };

        Self {
            inner,
            handle: Some(handle),
        }
    }

    /// Returns the latest completed cycle's view without blocking.
    ///
    /// Before the first cycle completes this is the default view with
    /// `refreshed_at: None` - the explicit "not yet available" state.
    pub fn snapshot(&self) -> Arc<ProjectsView> {
        self.inner
            .snapshot
            .lock()
            .map(|snapshot| Arc::clone(&snapshot))
            .unwrap_or_default()
    }

    /// Requests an out-of-band cycle. Requests made while a cycle is in
    /// flight collapse into a single follow-up cycle.
    pub fn refresh_now(&self) {
        if let Ok(mut control) = self.inner.control.lock() {
            control.refresh_requested = true;
        }
        self.inner.wakeup.notify_all();
    }

    /// Number of cycles that have published a view. Surfaced through the
    /// daemon health endpoint.
    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles_completed.load(Ordering::SeqCst)
    }

    /// Stops the loop: cancels in-flight probes, wakes the timer, and joins
    /// the thread. Idempotent.
    pub fn stop(&mut self) {
        self.inner.cancel.cancel();
        self.inner.wakeup.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Refresh scheduler thread panicked");
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(inner: Arc<SchedulerInner>) {
    tracing::info!(
        interval_secs = inner.config.refresh_interval.as_secs(),
        "Refresh scheduler started"
    );

    loop {
        if inner.cancel.is_cancelled() {
            break;
        }
        if run_cycle(&inner) {
            inner.cycles_completed.fetch_add(1, Ordering::SeqCst);
        }
        if !wait_for_next_cycle(&inner) {
            break;
        }
    }

    tracing::info!("Refresh scheduler stopped");
}

/// Runs one discovery cycle. Returns whether a view was published (a cycle
/// interrupted by shutdown publishes nothing).
fn run_cycle(inner: &SchedulerInner) -> bool {
    let candidates = locate_candidates(&inner.dirs);
    let live = probe_all(&candidates, inner.config.probe_timeout, &inner.cancel);
    if inner.cancel.is_cancelled() {
        return false;
    }

    let recent = inner.store.entries();
    let mut view = reconcile(&live, &recent);
    view.refreshed_at = Some(Utc::now().to_rfc3339());

    tracing::debug!(
        candidates = candidates.len(),
        open = view.open.len(),
        recent = view.recent.len(),
        "Publishing refreshed projects view"
    );

    if let Ok(mut snapshot) = inner.snapshot.lock() {
        *snapshot = Arc::new(view);
    }
    true
}

/// Probes every candidate concurrently, returning live instances in
/// completion order. One stalled candidate costs only its own timeout.
fn probe_all(
    candidates: &[CandidateEndpoint],
    timeout: Duration,
    cancel: &CancelToken,
) -> Vec<LiveInstance> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let (tx, rx) = mpsc::channel();
    for candidate in candidates {
        let tx = tx.clone();
        let socket_path = candidate.socket_path.clone();
        let cancel = cancel.clone();
        thread::spawn(move || {
            let outcome = probe_endpoint(&socket_path, timeout, &cancel);
            let _ = tx.send((socket_path, outcome));
        });
    }
    drop(tx);

    let mut live = Vec::new();
    for _ in 0..candidates.len() {
        if cancel.is_cancelled() {
            break;
        }
        match rx.recv_timeout(timeout + COLLECT_SLACK) {
            Ok((path, ProbeOutcome::Alive(instance))) => {
                tracing::debug!(path = %path.display(), version = %instance.version, "Endpoint alive");
                live.push(instance);
            }
            Ok((path, outcome)) => {
                tracing::debug!(path = %path.display(), outcome = ?outcome, "Endpoint not live");
            }
            Err(_) => break,
        }
    }

    live
}

/// Sleeps until the next cycle is due, a refresh is requested, or the
/// scheduler is stopped. Returns `false` on stop.
fn wait_for_next_cycle(inner: &SchedulerInner) -> bool {
    let deadline = Instant::now() + inner.config.refresh_interval;
    let mut control = match inner.control.lock() {
        Ok(control) => control,
        Err(poisoned) => poisoned.into_inner(),
    };

    loop {
        if inner.cancel.is_cancelled() {
            return false;
        }
        if control.refresh_requested {
            control.refresh_requested = false;
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }

        control = match inner.wakeup.wait_timeout(control, deadline - now) {
            Ok((control, _)) => control,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}
