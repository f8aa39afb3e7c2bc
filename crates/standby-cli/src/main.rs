//! standby: wait for a remote resource to become ready.
//!
//! ```text
//! standby wait --command 'warehouse-cli state wh-1' --timeout 5m
//! standby ensure --state-command '...' --start-command '...' --resource wh-1
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use standby_core::{CancellationToken, PollError, Poller};
use standby_runtime::{LifecycleError, PollConfig, Readiness, ResourceLifecycle, StartAction};

mod shell;

use shell::{CommandClient, CommandError};

#[derive(Parser, Debug)]
#[command(name = "standby", version, about = "Wait for remote resources to become ready")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll a shell command until it prints a ready state
    Wait(WaitArgs),

    /// Start a resource if it is stopped, then wait until it is running
    Ensure(EnsureArgs),
}

#[derive(Args, Debug, Clone)]
struct TimingArgs {
    /// YAML or JSON polling config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sleep between queries (e.g. 10s, 500ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Give up after this long (e.g. 5m)
    #[arg(long, value_parser = humantime::parse_duration, conflicts_with = "no_timeout")]
    timeout: Option<Duration>,

    /// Wait indefinitely
    #[arg(long)]
    no_timeout: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl TimingArgs {
    /// Config file (or defaults) with command-line overrides applied.
    fn resolve(&self) -> Result<PollConfig> {
        let mut config = match &self.config {
            Some(path) => PollConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PollConfig::default(),
        };

        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if self.no_timeout {
            config.timeout = None;
        } else if let Some(timeout) = self.timeout {
            config.timeout = Some(timeout);
        }

        Ok(config)
    }
}

#[derive(Args, Debug)]
struct WaitArgs {
    /// Shell command that prints the current state
    #[arg(long)]
    command: String,

    /// State label that counts as ready (repeatable)
    #[arg(long = "ready", default_values_t = vec!["RUNNING".to_string()])]
    ready: Vec<String>,

    /// State label that counts as unrecoverable (repeatable)
    #[arg(long = "fail", default_values_t = vec!["DELETED".to_string(), "DELETING".to_string()])]
    fail: Vec<String>,

    #[command(flatten)]
    timing: TimingArgs,
}

#[derive(Args, Debug)]
struct EnsureArgs {
    /// Shell command that prints the resource state; receives STANDBY_RESOURCE_ID
    #[arg(long)]
    state_command: String,

    /// Shell command that starts the resource; receives STANDBY_RESOURCE_ID
    #[arg(long)]
    start_command: String,

    /// Shell command that prints a JSON array of resources
    #[arg(long, required_unless_present = "resource")]
    list_command: Option<String>,

    /// Resource id; defaults to the first listed resource
    #[arg(long)]
    resource: Option<String>,

    #[command(flatten)]
    timing: TimingArgs,
}

#[derive(Serialize)]
struct WaitReport<'a> {
    state: &'a str,
    queries: u32,
    elapsed_ms: u128,
}

#[derive(Serialize)]
struct EnsureReport<'a> {
    resource: &'a str,
    state: &'a str,
    action: StartAction,
    queries: u32,
    elapsed_ms: u128,
}

mod exit {
    pub const TIMEOUT: u8 = 2;
    pub const TERMINAL: u8 = 3;
    pub const QUERY_FAILED: u8 = 4;
    pub const CANCELLED: u8 = 130;
}

fn poll_exit_code<S, E>(err: &PollError<S, E>) -> u8 {
    match err {
        PollError::Timeout { .. } => exit::TIMEOUT,
        PollError::TerminalState(_) => exit::TERMINAL,
        PollError::QueryFailed(_) => exit::QUERY_FAILED,
        PollError::Cancelled => exit::CANCELLED,
        PollError::InvalidPolicy(_) => 1,
    }
}

fn lifecycle_exit_code(err: &LifecycleError) -> u8 {
    match err {
        LifecycleError::Poll { source, .. } => poll_exit_code(source),
        LifecycleError::Unavailable { .. } => exit::TERMINAL,
        LifecycleError::Client(_) => exit::QUERY_FAILED,
        LifecycleError::NoResources | LifecycleError::Config(_) => 1,
    }
}

fn normalize(labels: &[String]) -> Vec<String> {
    labels.iter().map(|l| l.trim().to_ascii_uppercase()).collect()
}

fn run_wait(args: WaitArgs, cancel: CancellationToken) -> Result<u8> {
    let config = args.timing.resolve()?;
    let policy = config.policy()?;
    let ready = normalize(&args.ready);
    let fail = normalize(&args.fail);

    tracing::info!(
        command = %args.command,
        interval = ?policy.interval(),
        timeout = ?policy.timeout(),
        "Waiting for ready state"
    );

    let poller = Poller::new(policy).with_cancellation(cancel);
    let result = poller.run_observed(
        || shell::run(&args.command, None).map(|out| out.to_ascii_uppercase()),
        |state: &String| ready.contains(state),
        |state: &String| fail.contains(state),
        |attempt| {
            tracing::info!(
                attempt = attempt.attempt,
                elapsed_secs = attempt.elapsed.as_secs(),
                state = %attempt.state,
                "Still waiting"
            );
        },
    );

    match result {
        Ok(outcome) => {
            if args.timing.json {
                let report = WaitReport {
                    state: &outcome.state,
                    queries: outcome.queries,
                    elapsed_ms: outcome.elapsed.as_millis(),
                };
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!("{}", outcome.state);
            }
            Ok(0)
        }
        Err(err) => {
            let err: PollError<String, CommandError> = err;
            tracing::error!(error = %err, "Resource did not become ready");
            Ok(poll_exit_code(&err))
        }
    }
}

async fn run_ensure(args: EnsureArgs, cancel: CancellationToken) -> Result<u8> {
    let config = args.timing.resolve()?;
    let client = Arc::new(CommandClient::new(
        args.state_command,
        args.start_command,
        args.list_command,
    ));
    let lifecycle = ResourceLifecycle::new(client, config).with_cancellation(cancel);

    match select_and_ensure(&lifecycle, args.resource).await {
        Ok(readiness) => {
            if args.timing.json {
                let report = EnsureReport {
                    resource: &readiness.id,
                    state: readiness.state.as_str(),
                    action: readiness.action,
                    queries: readiness.queries,
                    elapsed_ms: readiness.elapsed.as_millis(),
                };
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!("{} {}", readiness.id, readiness.state);
            }
            Ok(0)
        }
        Err(err) => {
            tracing::error!(error = %err, "Resource did not become ready");
            Ok(lifecycle_exit_code(&err))
        }
    }
}

async fn select_and_ensure(
    lifecycle: &ResourceLifecycle,
    resource: Option<String>,
) -> Result<Readiness, LifecycleError> {
    let id = match resource {
        Some(id) => id,
        None => lifecycle.select_resource().await?.id,
    };
    lifecycle.ensure_running(&id).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let result = match cli.command {
        Commands::Wait(args) => tokio::task::spawn_blocking(move || run_wait(args, cancel))
            .await
            .context("wait task panicked")
            .and_then(|r| r),
        Commands::Ensure(args) => run_ensure(args, cancel).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
