//! Bounded retry with backoff, and the cancellation token shared by the
//! retry loops, the prober, and the scheduler.
//!
//! Replaces ad hoc fixed-count sleep loops: every wait is bounded, every
//! sleep happens in short slices so cancellation is honored promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while waiting; cancellation latency is
/// bounded by this slice.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Shared cancellation flag. Cloning hands out another handle to the same
/// flag; cancelling any handle cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Sleeps for `duration` in short slices, returning early when cancelled.
/// Returns `false` if the sleep was interrupted by cancellation.
pub fn sleep_cancellable(duration: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles per attempt up to `max_delay`.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("operation cancelled")]
    Cancelled,
    #[error("all {attempts} attempts failed: {last}")]
    Exhausted { attempts: usize, last: E },
}

/// Runs `op` until it succeeds, the policy is exhausted, or the token is
/// cancelled. The attempt index (starting at 0) is passed to `op`.
pub fn retry_with_backoff<T, E, F>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut(usize) -> Result<T, E>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut last_err = None;

    for attempt in 0..attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(attempt, error = %err, "Retryable operation failed");
                last_err = Some(err);
            }
        }

        if attempt + 1 < attempts {
            if !sleep_cancellable(delay, cancel) {
                return Err(RetryError::Cancelled);
            }
            delay = (delay * 2).min(policy.max_delay);
        }
    }

    Err(RetryError::Exhausted {
        attempts,
        last: last_err.expect("at least one attempt ran"),
    })
}
