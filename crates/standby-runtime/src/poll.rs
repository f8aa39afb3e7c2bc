//! Async readiness polling on the tokio clock.
//!
//! Same contract as [`standby_core::Poller`]: cancellation is checked before
//! every query and every sleep, readiness wins over terminal failure, query
//! errors end the session, and the deadline is checked before sleeping. A
//! sleep or query in progress is abandoned as soon as the token is cancelled.

use std::future::Future;
use tokio::time::Instant;

use standby_core::{CancellationToken, PollAttempt, PollError, PollOutcome, PollPolicy};

/// Async counterpart of [`standby_core::Poller`].
#[derive(Debug, Clone)]
pub struct AsyncPoller {
    policy: PollPolicy,
    cancel: Option<CancellationToken>,
}

impl AsyncPoller {
    /// Create a poller with the given policy.
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Abort polling once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The policy in effect.
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll until ready and return the ready state.
    pub async fn await_state<S, E, Q, Fut, R, F>(
        &self,
        query: Q,
        is_ready: R,
        is_terminal_failure: F,
    ) -> Result<S, PollError<S, E>>
    where
        Q: FnMut() -> Fut,
        Fut: Future<Output = Result<S, E>>,
        R: Fn(&S) -> bool,
        F: Fn(&S) -> bool,
    {
        self.run_observed(query, is_ready, is_terminal_failure, |_| {})
            .await
            .map(|outcome| outcome.state)
    }

    /// Poll until ready, calling `observer` after every not-ready query.
    pub async fn run_observed<S, E, Q, Fut, R, F, O>(
        &self,
        mut query: Q,
        is_ready: R,
        is_terminal_failure: F,
        mut observer: O,
    ) -> Result<PollOutcome<S>, PollError<S, E>>
    where
        Q: FnMut() -> Fut,
        Fut: Future<Output = Result<S, E>>,
        R: Fn(&S) -> bool,
        F: Fn(&S) -> bool,
        O: FnMut(&PollAttempt<'_, S>),
    {
        let mut started: Option<Instant> = None;
        let mut queries: u32 = 0;

        loop {
            if self.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            let started_at = *started.get_or_insert_with(Instant::now);
            queries += 1;
            let state = match &self.cancel {
                Some(token) => tokio::select! {
                    biased;
                    result = query() => result,
                    _ = token.cancelled() => return Err(PollError::Cancelled),
                },
                None => query().await,
            }
            .map_err(PollError::QueryFailed)?;
            let elapsed = started_at.elapsed();

            if is_ready(&state) {
                return Ok(PollOutcome {
                    state,
                    queries,
                    elapsed,
                });
            }
            if is_terminal_failure(&state) {
                return Err(PollError::TerminalState(state));
            }

            observer(&PollAttempt {
                attempt: queries,
                elapsed,
                state: &state,
            });

            if self.policy.next_query_misses_deadline(elapsed) {
                return Err(PollError::Timeout { elapsed, queries });
            }

            if !sleep_unless_cancelled(self.policy.interval(), self.cancel.as_ref()).await {
                return Err(PollError::Cancelled);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

/// Sleep for `delay`, ending early if `cancel` fires.
///
/// Returns `false` if the token was cancelled before or during the sleep.
pub(crate) async fn sleep_unless_cancelled(
    delay: std::time::Duration,
    cancel: Option<&CancellationToken>,
) -> bool {
    match cancel {
        Some(token) => {
            if token.is_cancelled() {
                return false;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => !token.is_cancelled(),
                _ = token.cancelled() => false,
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

/// Poll `query` until it reports a ready state.
///
/// Convenience form of [`AsyncPoller::await_state`].
pub async fn await_state_async<S, E, Q, Fut, R, F>(
    query: Q,
    is_ready: R,
    is_terminal_failure: F,
    interval: std::time::Duration,
    timeout: Option<std::time::Duration>,
) -> Result<S, PollError<S, E>>
where
    Q: FnMut() -> Fut,
    Fut: Future<Output = Result<S, E>>,
    R: Fn(&S) -> bool,
    F: Fn(&S) -> bool,
{
    let policy = PollPolicy::new(interval)?.with_timeout(timeout);
    AsyncPoller::new(policy)
        .await_state(query, is_ready, is_terminal_failure)
        .await
}
