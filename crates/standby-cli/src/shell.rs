//! Shell-command backed state queries.
//!
//! Commands run through `sh -c`. The resource id, when there is one, is
//! passed in the `STANDBY_RESOURCE_ID` environment variable. A command's
//! trimmed stdout is its answer; a non-zero exit is a failed query.

use async_trait::async_trait;
use std::io;
use std::process::{Command, ExitStatus, Output};
use thiserror::Error;

use standby_runtime::{ClientError, ResourceClient, ResourceState, ResourceSummary};

/// Environment variable carrying the resource id into commands.
pub const RESOURCE_ID_ENV: &str = "STANDBY_RESOURCE_ID";

/// Errors from running a shell command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

impl From<CommandError> for ClientError {
    fn from(err: CommandError) -> Self {
        ClientError::Request(err.to_string())
    }
}

fn shell_command(command: &str, resource: Option<&str>) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(id) = resource {
        cmd.env(RESOURCE_ID_ENV, id);
    }
    cmd
}

fn stdout_of(command: &str, output: io::Result<Output>) -> Result<String, CommandError> {
    let output = output.map_err(|source| CommandError::Spawn {
        command: command.to_string(),
        source,
    })?;

    if !output.status.success() {
        return Err(CommandError::Failed {
            command: command.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run `command` and return its trimmed stdout, blocking the thread.
pub fn run(command: &str, resource: Option<&str>) -> Result<String, CommandError> {
    stdout_of(command, shell_command(command, resource).output())
}

/// Run `command` on the tokio process driver and return its trimmed stdout.
pub async fn run_async(command: &str, resource: Option<&str>) -> Result<String, CommandError> {
    let output = tokio::process::Command::from(shell_command(command, resource))
        .output()
        .await;
    stdout_of(command, output)
}

/// [`ResourceClient`] whose operations are shell commands.
///
/// - `list` prints a JSON array of `{id, name, state}` objects
/// - `state` prints one state label, e.g. `RUNNING`
/// - `start` only needs to exit successfully
#[derive(Debug, Clone)]
pub struct CommandClient {
    list: Option<String>,
    state: String,
    start: String,
}

impl CommandClient {
    /// Create a client from its commands. Without a list command the
    /// listing is empty.
    pub fn new(state: impl Into<String>, start: impl Into<String>, list: Option<String>) -> Self {
        Self {
            list,
            state: state.into(),
            start: start.into(),
        }
    }
}

#[async_trait]
impl ResourceClient for CommandClient {
    async fn list(&self) -> Result<Vec<ResourceSummary>, ClientError> {
        let Some(command) = &self.list else {
            return Ok(Vec::new());
        };

        let stdout = run_async(command, None).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| ClientError::Request(format!("invalid resource listing: {}", e)))
    }

    async fn state(&self, id: &str) -> Result<ResourceState, ClientError> {
        run_async(&self.state, Some(id)).await?.parse()
    }

    async fn start(&self, id: &str) -> Result<(), ClientError> {
        run_async(&self.start, Some(id)).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "command"
    }
}
