use std::fmt;
use std::fmt::Formatter;
use std::process::Stdio;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

pub mod launcher;
pub mod controller;
pub mod collector;
pub mod merge;
pub mod run_dir;
pub mod report;
pub mod orchestrator;

/// What a finished sub process left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut {
        program: String,
        timeout: Duration,
    },
}

/// Helper method to run sub commands since there is a lot of boilerplate. See the public wrappers
/// `run_subprocess_command` and `run_subprocess_command_allow_fail`.
/// The child is killed if the timeout elapses or the returned future is dropped, so an abandoned
/// stage never leaves a local `aws` process behind.
async fn _run_subprocess_command(
    starting_command: &str,
    command_string: Vec<String>,
    allow_fail: bool,
    timeout: Option<Duration>,
) -> Result<CommandOutput, CommandError> {
    tracing::debug!("running command: {} {}", starting_command, shell_words::join(&command_string));

    let mut command = Command::new(starting_command);
    command
        .args(&command_string)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    let sub_process = command.output();

    let sub_process = match timeout {
        Some(limit) => match tokio::time::timeout(limit, sub_process).await {
            Ok(res) => res,
            Err(_) => {
                return Err(CommandError::TimedOut { program: starting_command.to_string(), timeout: limit });
            }
        },
        None => sub_process.await,
    }
    .map_err(|source| CommandError::Spawn { program: starting_command.to_string(), source })?;

    let output = CommandOutput {
        code: sub_process.status.code(),
        stdout: String::from_utf8_lossy(&sub_process.stdout).to_string(),
        stderr: String::from_utf8_lossy(&sub_process.stderr).trim().to_string(),
    };

    // if the command failed and not allowing fail
    if !output.success() && !allow_fail {
        return Err(CommandError::Failed {
            program: starting_command.to_string(),
            code: output.code,
            stderr: output.stderr,
        });
    }
    // command failed but allowed to fail, log the reason
    if !output.success() {
        tracing::warn!("command {} failed but allowed to fail, error: {}", starting_command, output.stderr);
    }
    Ok(output)
}

/// Run a command, a non-zero exit is an error. Returns stdout.
pub async fn run_subprocess_command(
    starting_command: &str,
    command_string: Vec<String>,
    timeout: Option<Duration>,
) -> Result<String, CommandError> {
    let output = _run_subprocess_command(starting_command, command_string, false, timeout).await?;
    Ok(output.stdout)
}

/// Run a command and hand back the exit status whatever it was. Only a failure to start or a
/// timeout is an error.
pub async fn run_subprocess_command_allow_fail(
    starting_command: &str,
    command_string: Vec<String>,
    timeout: Option<Duration>,
) -> Result<CommandOutput, CommandError> {
    _run_subprocess_command(starting_command, command_string, true, timeout).await
}

/// Success and failure counts for one fan-out stage
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StageSummary {
    pub fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempted, {} succeeded, {} failed", self.attempted, self.succeeded, self.failed)
    }
}
