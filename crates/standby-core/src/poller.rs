//! Readiness polling loop.
//!
//! One call is one self-contained session: query, classify, then either
//! finish or sleep and query again. Nothing is retained between sessions.
//!
//! Within a session the order of checks is fixed:
//! 1. cancellation, before every query
//! 2. query (errors end the session as [`PollError::QueryFailed`])
//! 3. readiness, which wins over terminal failure
//! 4. terminal failure
//! 5. deadline: stop if the next query would land at or after the timeout
//! 6. cancellation, before every sleep

use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::clock::{Clock, SystemClock};
use crate::error::PollError;
use crate::policy::PollPolicy;

/// A non-final observation, handed to the observer of [`Poller::run_observed`].
#[derive(Debug)]
pub struct PollAttempt<'a, S> {
    /// 1-based query number within the session
    pub attempt: u32,

    /// Time since the first query was issued
    pub elapsed: Duration,

    /// State returned by this query
    pub state: &'a S,
}

/// Successful end of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome<S> {
    /// The state that satisfied the readiness predicate
    pub state: S,

    /// Number of queries issued, including the final one
    pub queries: u32,

    /// Time since the first query was issued
    pub elapsed: Duration,
}

/// Polls a state query until it reports readiness.
///
/// The poller itself is stateless between calls; it only carries the policy,
/// the clock and an optional cancellation token.
#[derive(Debug, Clone)]
pub struct Poller<C = SystemClock> {
    policy: PollPolicy,
    clock: C,
    cancel: Option<CancellationToken>,
}

impl Poller<SystemClock> {
    /// Create a poller that sleeps on the wall clock.
    pub fn new(policy: PollPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> Poller<C> {
    /// Create a poller with an explicit time source.
    pub fn with_clock(policy: PollPolicy, clock: C) -> Self {
        Self {
            policy,
            clock,
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
    pub fn await_state<S, E, Q, R, F>(
        &self,
        query: Q,
        is_ready: R,
        is_terminal_failure: F,
    ) -> Result<S, PollError<S, E>>
    where
        Q: FnMut() -> Result<S, E>,
        R: Fn(&S) -> bool,
        F: Fn(&S) -> bool,
    {
        self.run(query, is_ready, is_terminal_failure)
            .map(|outcome| outcome.state)
    }

    /// Poll until ready and return the state with query count and elapsed time.
    pub fn run<S, E, Q, R, F>(
        &self,
        query: Q,
        is_ready: R,
        is_terminal_failure: F,
    ) -> Result<PollOutcome<S>, PollError<S, E>>
    where
        Q: FnMut() -> Result<S, E>,
        R: Fn(&S) -> bool,
        F: Fn(&S) -> bool,
    {
        self.run_observed(query, is_ready, is_terminal_failure, |_| {})
    }

    /// Like [`Poller::run`], calling `observer` after every query that
    /// neither succeeded nor failed.
    ///
    /// The observer runs before the deadline check, so the last not-ready
    /// state of a session that times out is still observed.
    pub fn run_observed<S, E, Q, R, F, O>(
        &self,
        mut query: Q,
        is_ready: R,
        is_terminal_failure: F,
        mut observer: O,
    ) -> Result<PollOutcome<S>, PollError<S, E>>
    where
        Q: FnMut() -> Result<S, E>,
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

            let started_at = *started.get_or_insert_with(|| self.clock.now());
            queries += 1;
            let state = query().map_err(PollError::QueryFailed)?;
            let elapsed = self.clock.now().saturating_duration_since(started_at);

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

            if self.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            self.clock.sleep(self.policy.interval(), self.cancel.as_ref());
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;
    use std::convert::Infallible;
    use std::io;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Pending,
        Ready,
        Failed,
        // Satisfies both predicates
        Ambiguous,
    }

    fn is_ready(state: &Phase) -> bool {
        matches!(state, Phase::Ready | Phase::Ambiguous)
    }

    fn is_failed(state: &Phase) -> bool {
        matches!(state, Phase::Failed | Phase::Ambiguous)
    }

    fn manual_poller(interval_secs: u64, timeout_secs: Option<u64>) -> (Poller<ManualClock>, ManualClock) {
        let policy = PollPolicy::new(Duration::from_secs(interval_secs))
            .unwrap()
            .with_timeout(timeout_secs.map(Duration::from_secs));
        let clock = ManualClock::new();
        (Poller::with_clock(policy, clock.clone()), clock)
    }

    #[test]
    fn test_ready_on_first_query_does_not_sleep() {
        let (poller, clock) = manual_poller(5, Some(60));
        let mut calls = 0;

        let outcome = poller
            .run(
                || {
                    calls += 1;
                    Ok::<_, Infallible>(Phase::Ready)
                },
                is_ready,
                is_failed,
            )
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(outcome.state, Phase::Ready);
        assert_eq!(outcome.queries, 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_ready_after_pending_states() {
        let (poller, clock) = manual_poller(5, Some(60));
        let mut script = vec![Phase::Pending, Phase::Pending, Phase::Ready].into_iter();

        let outcome = poller
            .run(|| Ok::<_, Infallible>(script.next().unwrap()), is_ready, is_failed)
            .unwrap();

        assert_eq!(outcome.queries, 3);
        assert_eq!(outcome.elapsed, Duration::from_secs(10));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 2]);
    }

    #[test]
    fn test_terminal_state_on_first_query() {
        let (poller, clock) = manual_poller(5, Some(60));
        let mut calls = 0;

        let result = poller.await_state(
            || {
                calls += 1;
                Ok::<_, Infallible>(Phase::Failed)
            },
            is_ready,
            is_failed,
        );

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(PollError::TerminalState(Phase::Failed))));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_ready_takes_precedence_over_terminal() {
        let (poller, _clock) = manual_poller(5, Some(60));

        let state = poller
            .await_state(|| Ok::<_, Infallible>(Phase::Ambiguous), is_ready, is_failed)
            .unwrap();

        assert_eq!(state, Phase::Ambiguous);
    }

    #[test]
    fn test_timeout_shorter_than_interval_queries_once() {
        let (poller, clock) = manual_poller(10, Some(3));
        let mut calls = 0;

        let result = poller.await_state(
            || {
                calls += 1;
                Ok::<_, Infallible>(Phase::Pending)
            },
            is_ready,
            is_failed,
        );

        assert_eq!(calls, 1);
        assert!(matches!(
            result,
            Err(PollError::Timeout { queries: 1, .. })
        ));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_timeout_shorter_than_interval_still_succeeds_when_ready() {
        let (poller, _clock) = manual_poller(10, Some(3));

        let result = poller.await_state(|| Ok::<_, Infallible>(Phase::Ready), is_ready, is_failed);
        assert_eq!(result.unwrap(), Phase::Ready);
    }

    #[test]
    fn test_five_intervals_allow_five_queries() {
        let (poller, clock) = manual_poller(2, Some(10));
        let mut calls = 0;

        let result = poller.await_state(
            || {
                calls += 1;
                Ok::<_, Infallible>(Phase::Pending)
            },
            is_ready,
            is_failed,
        );

        assert_eq!(calls, 5);
        match result {
            Err(PollError::Timeout { elapsed, queries }) => {
                assert_eq!(queries, 5);
                assert_eq!(elapsed, Duration::from_secs(8));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(clock.sleeps().len(), 4);
    }

    #[test]
    fn test_slow_queries_count_against_deadline() {
        let (poller, clock) = manual_poller(2, Some(10));
        let query_clock = clock.clone();
        let mut calls = 0;

        let result = poller.await_state(
            || {
                calls += 1;
                query_clock.advance(Duration::from_secs(3));
                Ok::<_, Infallible>(Phase::Pending)
            },
            is_ready,
            is_failed,
        );

        // Queries finish at 3s, 8s; the next would start at 10s.
        assert_eq!(calls, 2);
        assert!(result.unwrap_err().is_timeout());
    }

    #[test]
    fn test_query_error_is_not_retried() {
        let (poller, clock) = manual_poller(1, None);
        let mut calls = 0;

        let result: Result<Phase, _> = poller.await_state(
            || {
                calls += 1;
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
            },
            is_ready,
            is_failed,
        );

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(PollError::QueryFailed(ref e)) if e.kind() == io::ErrorKind::TimedOut));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_cancelled_before_first_query() {
        let (poller, _clock) = manual_poller(1, None);
        let token = CancellationToken::new();
        token.cancel();
        let poller = poller.with_cancellation(token);
        let mut calls = 0;

        let result = poller.await_state(
            || {
                calls += 1;
                Ok::<_, Infallible>(Phase::Ready)
            },
            is_ready,
            is_failed,
        );

        assert_eq!(calls, 0);
        assert!(matches!(result, Err(PollError::Cancelled)));
    }

    #[test]
    fn test_cancel_during_query_stops_before_sleep() {
        let (poller, clock) = manual_poller(1, None);
        let token = CancellationToken::new();
        let poller = poller.with_cancellation(token.clone());
        let mut calls = 0;

        let result = poller.await_state(
            || {
                calls += 1;
                if calls == 3 {
                    token.cancel();
                }
                Ok::<_, Infallible>(Phase::Pending)
            },
            is_ready,
            is_failed,
        );

        assert_eq!(calls, 3);
        assert!(matches!(result, Err(PollError::Cancelled)));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[test]
    fn test_observer_sees_every_pending_state() {
        let (poller, _clock) = manual_poller(5, Some(60));
        let mut script = vec![Phase::Pending, Phase::Pending, Phase::Ready].into_iter();
        let mut seen = Vec::new();

        poller
            .run_observed(
                || Ok::<_, Infallible>(script.next().unwrap()),
                is_ready,
                is_failed,
                |attempt| seen.push((attempt.attempt, attempt.elapsed, *attempt.state)),
            )
            .unwrap();

        assert_eq!(
            seen,
            vec![
                (1, Duration::ZERO, Phase::Pending),
                (2, Duration::from_secs(5), Phase::Pending),
            ]
        );
    }

    #[test]
    fn test_sessions_are_independent() {
        let (poller, _clock) = manual_poller(1, Some(3));

        for _ in 0..2 {
            let result = poller.await_state(|| Ok::<_, Infallible>(Phase::Pending), is_ready, is_failed);
            assert!(matches!(result, Err(PollError::Timeout { queries: 3, .. })));
        }
    }

    #[test]
    fn test_system_clock_poller() {
        let policy = PollPolicy::bounded(Duration::from_millis(1), Duration::from_secs(5)).unwrap();
        let poller = Poller::new(policy);
        let mut script = vec![Phase::Pending, Phase::Ready].into_iter();

        let outcome = poller
            .run(|| Ok::<_, Infallible>(script.next().unwrap()), is_ready, is_failed)
            .unwrap();
        assert_eq!(outcome.queries, 2);
    }

    #[test]
    fn test_cancel_wakes_unrepresentable_system_sleep() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let poller = Poller::new(PollPolicy::new(Duration::from_secs(u64::MAX / 2)).unwrap())
            .with_cancellation(token);

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.cancel();
        });

        let result = poller.await_state(|| Ok::<_, Infallible>(Phase::Pending), is_ready, is_failed);
        canceller.join().unwrap();

        assert!(matches!(result, Err(PollError::Cancelled)));
    }

    proptest! {
        #[test]
        fn prop_first_ready_at_k_takes_k_plus_one_queries(k in 0u32..64, interval_ms in 1u64..5_000) {
            let policy = PollPolicy::new(Duration::from_millis(interval_ms)).unwrap();
            let clock = ManualClock::new();
            let poller = Poller::with_clock(policy, clock.clone());
            let mut calls = 0u32;

            let outcome = poller
                .run(
                    || {
                        calls += 1;
                        Ok::<_, Infallible>(if calls == k + 1 { Phase::Ready } else { Phase::Pending })
                    },
                    is_ready,
                    is_failed,
                )
                .unwrap();

            prop_assert_eq!(calls, k + 1);
            prop_assert_eq!(outcome.queries, k + 1);
            prop_assert_eq!(clock.sleeps().len() as u32, k);
        }

        #[test]
        fn prop_timeout_of_n_intervals_allows_n_queries(n in 1u32..64, interval_ms in 1u64..5_000) {
            let interval = Duration::from_millis(interval_ms);
            let policy = PollPolicy::bounded(interval, interval * n).unwrap();
            let poller = Poller::with_clock(policy, ManualClock::new());
            let mut calls = 0u32;

            let result = poller.await_state(
                || {
                    calls += 1;
                    Ok::<_, Infallible>(Phase::Pending)
                },
                is_ready,
                is_failed,
            );

            prop_assert_eq!(calls, n);
            prop_assert!(result.unwrap_err().is_timeout());
        }

        #[test]
        fn prop_query_error_is_single_attempt(timeout_secs in proptest::option::of(0u64..1_000)) {
            let policy = PollPolicy::new(Duration::from_secs(1))
                .unwrap()
                .with_timeout(timeout_secs.map(Duration::from_secs));
            let poller = Poller::with_clock(policy, ManualClock::new());
            let mut calls = 0u32;

            let result: Result<Phase, _> = poller.await_state(
                || {
                    calls += 1;
                    Err(io::Error::new(io::ErrorKind::Other, "boom"))
                },
                is_ready,
                is_failed,
            );

            prop_assert_eq!(calls, 1);
            prop_assert!(matches!(result, Err(PollError::QueryFailed(_))));
        }
    }
}
