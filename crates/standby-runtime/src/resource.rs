//! Remote resource abstractions.
//!
//! A [`ResourceClient`] is the seam between the lifecycle logic and a vendor
//! SDK: it lists resources, reads one resource's state and triggers a start.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from a resource client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Unknown resource state: {0}")]
    UnknownState(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Request(_) | ClientError::RateLimited)
    }
}

/// Lifecycle state reported by a managed warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Deleting,
    Deleted,
}

impl ResourceState {
    /// The resource accepts work.
    pub fn is_ready(&self) -> bool {
        matches!(self, ResourceState::Running)
    }

    /// The resource cannot become ready without outside intervention.
    ///
    /// `Stopping` and `Stopped` are not terminal: right after a start is
    /// triggered the remote side may still report them.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ResourceState::Deleting | ResourceState::Deleted)
    }

    /// Upper-case wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Starting => "STARTING",
            ResourceState::Running => "RUNNING",
            ResourceState::Stopping => "STOPPING",
            ResourceState::Stopped => "STOPPED",
            ResourceState::Deleting => "DELETING",
            ResourceState::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceState {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STARTING" => Ok(ResourceState::Starting),
            "RUNNING" => Ok(ResourceState::Running),
            "STOPPING" => Ok(ResourceState::Stopping),
            "STOPPED" => Ok(ResourceState::Stopped),
            "DELETING" => Ok(ResourceState::Deleting),
            "DELETED" => Ok(ResourceState::Deleted),
            _ => Err(ClientError::UnknownState(s.to_string())),
        }
    }
}

/// One entry of a resource listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    /// Identifier used for state queries and start requests
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// State at listing time
    pub state: ResourceState,
}

/// Client for a remote system that manages startable resources.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// List resources visible to this client, in the order the remote returns them.
    async fn list(&self) -> Result<Vec<ResourceSummary>, ClientError>;

    /// Read the current state of one resource.
    async fn state(&self, id: &str) -> Result<ResourceState, ClientError>;

    /// Ask the remote side to start a resource. Returns once the request is accepted.
    async fn start(&self, id: &str) -> Result<(), ClientError>;

    /// Name of the backing system, for logs.
    fn name(&self) -> &str {
        "resource"
    }
}
