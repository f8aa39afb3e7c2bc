//! # standby-runtime
//!
//! Async readiness polling and resource start-up for standby.
//!
//! `standby-core` provides the blocking poller. This crate adds:
//! - [`AsyncPoller`]: the same contract on the tokio clock
//! - [`ResourceClient`]: the seam to a vendor SDK (list, read state, start)
//! - [`ResourceLifecycle`]: start a stopped resource and wait until it runs
//! - [`PollConfig`]: YAML/JSON configuration with humantime durations
//!
//! ## Example
//!
//! ```rust,ignore
//! use standby_runtime::{PollConfig, ResourceLifecycle};
//!
//! let config = PollConfig::from_file("standby.yaml")?;
//! let lifecycle = ResourceLifecycle::new(client, config);
//!
//! let warehouse = lifecycle.select_resource().await?;
//! let readiness = lifecycle.ensure_running(&warehouse.id).await?;
//! println!("{} ready after {:?}", readiness.id, readiness.elapsed);
//! ```

pub mod config;
pub mod lifecycle;
pub mod poll;
pub mod resource;

pub use config::{ConfigError, PollConfig, ReadRetry};
pub use lifecycle::{LifecycleError, Readiness, ResourceLifecycle, StartAction};
pub use poll::{await_state_async, AsyncPoller};
pub use resource::{ClientError, ResourceClient, ResourceState, ResourceSummary};

// Core types used throughout the runtime API
pub use standby_core::{CancellationToken, PollError, PollOutcome, PollPolicy};
