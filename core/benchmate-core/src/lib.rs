//! # benchmate-core
//!
//! Discovery engine for Benchmate: finds running KiCad instances behind
//! local IPC sockets, probes them for liveness and metadata, and merges the
//! result with the persisted recent-projects history into one continuously
//! refreshed view.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency; the scheduler owns one
//!   background thread and probes fan out onto short-lived workers.
//! - **Routine failure is data**: unreachable or timed-out endpoints are
//!   [`probe::ProbeOutcome`] values, never errors.
//! - **Graceful degradation**: missing or corrupt persistence loads as
//!   empty state, not a failure.
//! - **Replace-on-refresh**: the published [`ProjectsView`] is swapped
//!   wholesale; readers never observe a partially updated snapshot.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use benchmate_core::{EndpointDirs, RecencyStore, RefreshScheduler, SchedulerConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(RecencyStore::load(&path, 10));
//! let scheduler = RefreshScheduler::start(
//!     SchedulerConfig::default(),
//!     EndpointDirs::resolve(),
//!     Arc::clone(&store),
//! );
//! let view = scheduler.snapshot();
//! ```

pub mod config;
pub mod error;
pub mod locator;
pub mod paths;
pub mod probe;
pub mod recency;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod storage;

// Re-export commonly used items at crate root
pub use benchmate_daemon_protocol::{OpenProject, ProjectsView, RecentProject};
pub use config::{load_runtime_config, DiscoveryConfig, RuntimeConfig};
pub use error::{CoreError, Result};
pub use locator::{locate_candidates, CandidateEndpoint, EndpointDirs, ENDPOINT_DIR_ENV};
pub use probe::{probe_endpoint, LiveInstance, ProbeOutcome, DEFAULT_PROBE_TIMEOUT};
pub use recency::{RecencyStore, RecentProjectEntry, DEFAULT_MAX_RECENT};
pub use reconcile::reconcile;
pub use retry::{retry_with_backoff, CancelToken, RetryError, RetryPolicy};
pub use scheduler::{RefreshScheduler, SchedulerConfig};
pub use storage::StorageConfig;
