//! Caller-driven polling with an explicit deadline.
//!
//! Used to wait out server-side eventual consistency, such as a group that
//! keeps showing up in listings for a while after `DELETE` returned. The loop
//! runs on the caller's thread; the core never schedules anything itself.

use std::thread;
use std::time::{Duration, Instant};

use backon::{BlockingRetryable, ConstantBuilder};

use crate::error::ApiError;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Shorter intervals, zero included, are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Total time allowed before giving up with `ApiError::Timeout`.
    pub timeout: Duration,
    /// Pause between two attempts, never below [`MIN_POLL_INTERVAL`].
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_POLL_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Result of one polling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    Done(T),
    Pending,
}

/// Why an attempt did not produce a value.
enum Miss {
    Pending,
    Failed(ApiError),
}

/// Run `attempt` until it reports `Done`, or fail once `options.timeout` has
/// elapsed.
///
/// `NotFound` from an attempt counts as `Pending`. Any other error is
/// returned immediately. Attempts are spaced by `options.interval`, never
/// less than [`MIN_POLL_INTERVAL`].
pub fn poll_until<T, F>(options: &PollOptions, mut attempt: F) -> Result<T, ApiError>
where
    F: FnMut() -> Result<PollState<T>, ApiError>,
{
    let started = Instant::now();
    let timeout = options.timeout;
    let backoff = ConstantBuilder::default()
        .with_delay(options.interval.max(MIN_POLL_INTERVAL))
        .with_max_times(usize::MAX);

    let mut attempts: u32 = 0;
    let outcome = (|| {
        attempts += 1;
        match attempt() {
            Ok(PollState::Done(value)) => Ok(value),
            Ok(PollState::Pending) => Err(Miss::Pending),
            Err(err) if err.is_not_found() => Err(Miss::Pending),
            Err(err) => Err(Miss::Failed(err)),
        }
    })
    .retry(backoff)
    .sleep(move |delay: Duration| {
        thread::sleep(delay.min(timeout.saturating_sub(started.elapsed())));
    })
    .when(|miss: &Miss| matches!(miss, Miss::Pending) && started.elapsed() < timeout)
    .notify(|_: &Miss, delay: Duration| tracing::trace!(?delay, "poll pending"))
    .call();

    match outcome {
        Ok(value) => {
            tracing::debug!(attempts, elapsed = ?started.elapsed(), "poll finished");
            Ok(value)
        }
        Err(Miss::Pending) => {
            tracing::warn!(attempts, ?timeout, "poll timed out");
            Err(ApiError::Timeout(timeout))
        }
        Err(Miss::Failed(err)) => Err(err),
    }
}
