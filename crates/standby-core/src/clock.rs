//! Time sources for the poller.
//!
//! [`SystemClock`] blocks the calling thread. [`ManualClock`] keeps virtual
//! time so polling schedules can be tested without waiting.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;

/// Source of time and sleeping used by [`crate::Poller`].
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block for `duration`. Implementations may return early once `cancel`
    /// is cancelled.
    fn sleep(&self, duration: Duration, cancel: Option<&CancellationToken>);
}

/// Wall clock backed by [`Instant::now`] and real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: Option<&CancellationToken>) {
        match cancel {
            Some(token) => {
                token.wait_timeout(duration);
            }
            None => thread::sleep(duration),
        }
    }
}

/// Virtual clock that only moves when slept on or advanced explicitly.
///
/// Clones share the same timeline, so a test can hand one clone to the
/// poller and keep another to inspect or advance time from inside a query.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// Create a clock at virtual time zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(ManualState::default())),
        }
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.offset = state.offset.saturating_add(by);
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().offset
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().offset
    }

    fn sleep(&self, duration: Duration, _cancel: Option<&CancellationToken>) {
        let mut state = self.state.lock();
        state.offset = state.offset.saturating_add(duration);
        state.sleeps.push(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration, cancel: Option<&CancellationToken>) {
        (**self).sleep(duration, cancel)
    }
}
