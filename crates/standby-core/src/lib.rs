//! # standby-core
//!
//! Deadline-aware readiness polling for remote resources.
//!
//! A caller triggers some remote operation (for example, starting a SQL
//! warehouse), then hands this crate a closure that reads the resource's
//! state. The poller queries, sleeps a fixed interval, and queries again
//! until the state is ready, a terminal failure, the deadline passes, or the
//! caller cancels.
//!
//! ## Key Guarantees
//!
//! 1. **Stateless**: every call is a fresh session; nothing carries over
//! 2. **No retries on read errors**: a failing query ends the session
//! 3. **Ready wins**: a state that is both ready and terminal counts as ready
//! 4. **Silent**: the poller never logs; callers decide what to report
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use standby_core::{await_state, PollError};
//!
//! client.start(&warehouse_id)?;
//!
//! let state = await_state(
//!     || client.state(&warehouse_id),
//!     |s| *s == State::Running,
//!     |s| matches!(s, State::Deleted | State::Deleting),
//!     Duration::from_secs(10),
//!     Some(Duration::from_secs(300)),
//! )?;
//! ```

pub mod cancel;
pub mod clock;
pub mod error;
pub mod policy;
pub mod poller;

// Re-export main types at crate root
pub use cancel::CancellationToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::PollError;
pub use policy::{PolicyError, PollPolicy, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
pub use poller::{PollAttempt, PollOutcome, Poller};

use std::time::Duration;

/// Poll `query` on the wall clock until it reports a ready state.
///
/// This is the convenience form of [`Poller::await_state`].
///
/// # Arguments
///
/// * `query` - Reads the current state; errors are returned as `QueryFailed`
/// * `is_ready` - Classifies a state as success
/// * `is_terminal_failure` - Classifies a state as unrecoverable
/// * `interval` - Sleep between queries, must be non-zero
/// * `timeout` - Deadline measured from the first query; `None` is unbounded
pub fn await_state<S, E, Q, R, F>(
    query: Q,
    is_ready: R,
    is_terminal_failure: F,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<S, PollError<S, E>>
where
    Q: FnMut() -> Result<S, E>,
    R: Fn(&S) -> bool,
    F: Fn(&S) -> bool,
{
    let policy = PollPolicy::new(interval)?.with_timeout(timeout);
    Poller::new(policy).await_state(query, is_ready, is_terminal_failure)
}
