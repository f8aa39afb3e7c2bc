//! Resource start-up lifecycle.
//!
//! Brings a remote resource to `RUNNING`:
//! - `RUNNING`: nothing to do
//! - `STOPPED`: trigger a start once, then wait
//! - `STARTING` / `STOPPING`: wait without triggering
//! - `DELETING` / `DELETED`: refuse
//!
//! Progress is logged here, not in the poller.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use backon::{ExponentialBuilder, Retryable};
use standby_core::{CancellationToken, PollError};

use crate::config::{ConfigError, PollConfig};
use crate::poll::AsyncPoller;
use crate::resource::{ClientError, ResourceClient, ResourceState, ResourceSummary};

/// Errors from the lifecycle manager.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("No resources available")]
    NoResources,

    #[error("Resource {id} is {state} and cannot be started")]
    Unavailable { id: String, state: ResourceState },

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Resource {id} did not become ready: {source}")]
    Poll {
        id: String,
        #[source]
        source: PollError<ResourceState, ClientError>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// What the lifecycle manager had to do to reach readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartAction {
    /// The resource was already running
    AlreadyRunning,

    /// A start was triggered and awaited
    Started,

    /// The resource was mid-transition; waited without triggering
    AwaitedTransition,
}

/// A resource that has reached readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Resource identifier
    pub id: String,

    /// Final state (always `Running`)
    pub state: ResourceState,

    /// What was done to get here
    pub action: StartAction,

    /// Poll queries issued after the initial state read
    pub queries: u32,

    /// Time spent polling
    pub elapsed: Duration,
}

/// Drives a resource to the running state through a [`ResourceClient`].
pub struct ResourceLifecycle {
    client: Arc<dyn ResourceClient>,
    config: PollConfig,
    cancel: Option<CancellationToken>,
}

impl ResourceLifecycle {
    /// Create a lifecycle manager.
    pub fn new(client: Arc<dyn ResourceClient>, config: PollConfig) -> Self {
        Self {
            client,
            config,
            cancel: None,
        }
    }

    /// Abort waiting once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Pick the first resource the client lists.
    pub async fn select_resource(&self) -> Result<ResourceSummary, LifecycleError> {
        let resource = self
            .client
            .list()
            .await?
            .into_iter()
            .next()
            .ok_or(LifecycleError::NoResources)?;

        tracing::info!(
            backend = self.client.name(),
            resource = %resource.id,
            name = %resource.name,
            state = %resource.state,
            "Selected resource"
        );
        Ok(resource)
    }

    /// Make sure the resource is running, starting it if it is stopped.
    pub async fn ensure_running(&self, id: &str) -> Result<Readiness, LifecycleError> {
        let policy = self.config.policy()?;
        let initial = self.read_state(id).await?;

        let action = match initial {
            ResourceState::Running => {
                tracing::info!(resource = %id, "Resource already running");
                return Ok(Readiness {
                    id: id.to_string(),
                    state: initial,
                    action: StartAction::AlreadyRunning,
                    queries: 0,
                    elapsed: Duration::ZERO,
                });
            }
            state if state.is_terminal_failure() => {
                return Err(LifecycleError::Unavailable {
                    id: id.to_string(),
                    state,
                });
            }
            ResourceState::Stopped => {
                tracing::info!(resource = %id, "Starting resource");
                self.client.start(id).await?;
                StartAction::Started
            }
            state => {
                tracing::info!(resource = %id, state = %state, "Resource in transition, waiting");
                StartAction::AwaitedTransition
            }
        };

        let mut poller = AsyncPoller::new(policy);
        if let Some(token) = &self.cancel {
            poller = poller.with_cancellation(token.clone());
        }

        let outcome = poller
            .run_observed(
                move || self.read_state(id),
                ResourceState::is_ready,
                ResourceState::is_terminal_failure,
                |attempt| {
                    if expected_while_waiting(*attempt.state) {
                        tracing::info!(
                            resource = %id,
                            attempt = attempt.attempt,
                            elapsed_secs = attempt.elapsed.as_secs(),
                            state = %attempt.state,
                            "Still waiting for resource"
                        );
                    } else {
                        tracing::warn!(
                            resource = %id,
                            attempt = attempt.attempt,
                            elapsed_secs = attempt.elapsed.as_secs(),
                            state = %attempt.state,
                            "Unexpected state while waiting for resource"
                        );
                    }
                },
            )
            .await
            .map_err(|source| LifecycleError::Poll {
                id: id.to_string(),
                source,
            })?;

        tracing::info!(
            resource = %id,
            queries = outcome.queries,
            elapsed = ?outcome.elapsed,
            "Resource is running"
        );

        Ok(Readiness {
            id: id.to_string(),
            state: outcome.state,
            action,
            queries: outcome.queries,
            elapsed: outcome.elapsed,
        })
    }

    /// Read one state, retrying transient failures when configured.
    async fn read_state(&self, id: &str) -> Result<ResourceState, ClientError> {
        let Some(retry) = &self.config.read_retry else {
            return self.client.state(id).await;
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(retry.min_delay)
            .with_max_times(retry.max_attempts.saturating_sub(1) as usize);
        let client = &self.client;

        (move || client.state(id))
            .retry(backoff)
            .when(|err: &ClientError| err.is_transient() && !self.is_cancelled())
            .notify(|err: &ClientError, delay: Duration| {
                tracing::warn!(resource = %id, error = %err, delay = ?delay, "Retrying state read");
            })
            .await
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

/// States a resource normally passes through on its way to running.
fn expected_while_waiting(state: ResourceState) -> bool {
    matches!(state, ResourceState::Starting | ResourceState::Running)
}
