//! Error taxonomy for a polling session.

use std::time::Duration;
use thiserror::Error;

use crate::policy::PolicyError;

/// Why a polling session ended without reaching readiness.
///
/// Every variant is final: the poller never retries past any of them.
/// `S` is the state type reported by the resource, `E` the error type of
/// the query.
#[derive(Error, Debug)]
pub enum PollError<S, E> {
    /// The deadline passed before the resource became ready.
    #[error("timed out after {elapsed:?} and {queries} queries waiting for readiness")]
    Timeout { elapsed: Duration, queries: u32 },

    /// The resource reported a state it cannot recover from on its own.
    #[error("resource reached terminal state {0:?}")]
    TerminalState(S),

    /// The state query itself failed.
    #[error("state query failed: {0}")]
    QueryFailed(#[source] E),

    /// The caller cancelled the session.
    #[error("polling cancelled")]
    Cancelled,

    /// The interval or timeout handed to the poller was unusable.
    #[error("invalid polling policy: {0}")]
    InvalidPolicy(#[from] PolicyError),
}

impl<S, E> PollError<S, E> {
    /// Returns true for [`PollError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }

    /// The terminal state, if that is why polling stopped.
    pub fn terminal_state(&self) -> Option<&S> {
        match self {
            PollError::TerminalState(state) => Some(state),
            _ => None,
        }
    }

    /// Convert the query error type, leaving every other variant intact.
    pub fn map_query_err<F, E2>(self, f: F) -> PollError<S, E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            PollError::Timeout { elapsed, queries } => PollError::Timeout { elapsed, queries },
            PollError::TerminalState(state) => PollError::TerminalState(state),
            PollError::QueryFailed(err) => PollError::QueryFailed(f(err)),
            PollError::Cancelled => PollError::Cancelled,
            PollError::InvalidPolicy(err) => PollError::InvalidPolicy(err),
        }
    }
}
