//! Polling cadence and deadline.

use std::time::Duration;
use thiserror::Error;

/// Interval used when no configuration is supplied.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Overall deadline used when no configuration is supplied.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors raised when building a [`PollPolicy`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
}

/// How often to query and how long to keep trying.
///
/// A policy without a timeout polls until the resource becomes ready, fails,
/// or the caller cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    timeout: Option<Duration>,
}

impl PollPolicy {
    /// Create an unbounded policy with the given interval.
    pub fn new(interval: Duration) -> Result<Self, PolicyError> {
        if interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        Ok(Self {
            interval,
            timeout: None,
        })
    }

    /// Create a policy that gives up once `timeout` has elapsed.
    pub fn bounded(interval: Duration, timeout: Duration) -> Result<Self, PolicyError> {
        Ok(Self::new(interval)?.with_timeout(Some(timeout)))
    }

    /// Replace the deadline. `None` removes it.
    ///
    /// A timeout shorter than the interval is accepted: the poller then
    /// issues a single query before timing out.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sleep between consecutive queries.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadline measured from the first query, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether a query scheduled `interval` after `elapsed` would miss the deadline.
    pub fn next_query_misses_deadline(&self, elapsed: Duration) -> bool {
        match self.timeout {
            Some(timeout) => elapsed.saturating_add(self.interval) >= timeout,
            None => false,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}
