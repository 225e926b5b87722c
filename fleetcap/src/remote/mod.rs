use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;
use crate::remote::commands::RemoteCommand;
use crate::target::Target;

pub mod commands;

/// Outcome of one remote invocation. Only used to update a session, never kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCommandResult {
    pub target_id: String,
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteCommandResult {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// The channel used to run shell commands on a target. The implementation decides how to reach
/// the target from its kind, region and group. An `Err` means the channel itself failed, a
/// command that ran and exited non-zero is an `Ok` with that exit status.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, target: &Target, command: &RemoteCommand) -> anyhow::Result<RemoteCommandResult>;
}

/// Why a remote command did not succeed, recorded against the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    #[error("exited with {code:?}: {stderr}")]
    Exited {
        code: Option<i32>,
        stderr: String,
    },
    #[error("remote execution failed: {0}")]
    Channel(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Run one command on one target, bounded by `timeout` so a target that never answers can't hold
/// up the rest of its stage.
pub async fn run_remote_command(
    executor: &dyn RemoteExecutor,
    target: &Target,
    command: &RemoteCommand,
    timeout: Duration,
) -> Result<RemoteCommandResult, RemoteFailure> {
    tracing::debug!("{} on {}: {}", command.name(), target.id, command.render());
    let result = match tokio::time::timeout(timeout, executor.execute(target, command)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => return Err(RemoteFailure::Channel(format!("{err:#}"))),
        Err(_) => return Err(RemoteFailure::TimedOut(timeout)),
    };
    if result.success() {
        Ok(result)
    } else {
        Err(RemoteFailure::Exited { code: result.exit_status, stderr: result.stderr.trim().to_string() })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{task, FakeExecutor};
    use super::*;
    use crate::remote::commands::CaptureFile;

    fn start() -> RemoteCommand {
        RemoteCommand::StartCapture {
            file: CaptureFile::new("/tmp", "t1"),
            interface: "any".into(),
            filter: String::new(),
            sudo: false,
        }
    }

    #[tokio::test]
    async fn test_run_remote_command_outcomes() {
        let executor = FakeExecutor::default();
        let ok = run_remote_command(&executor, &task("ok"), &start(), Duration::from_secs(1)).await;
        assert!(ok.is_ok());

        executor.exit_with("bad", 1);
        let bad = run_remote_command(&executor, &task("bad"), &start(), Duration::from_secs(1)).await;
        assert!(matches!(bad, Err(RemoteFailure::Exited { code: Some(1), .. })));

        executor.channel_error("gone");
        let gone = run_remote_command(&executor, &task("gone"), &start(), Duration::from_secs(1)).await;
        assert!(matches!(gone, Err(RemoteFailure::Channel(_))));

        executor.hang("slow");
        let slow = run_remote_command(&executor, &task("slow"), &start(), Duration::from_millis(50)).await;
        assert_eq!(slow, Err(RemoteFailure::TimedOut(Duration::from_millis(50))));

        assert_eq!(executor.calls_for("ok"), vec!["start capture"]);
    }
}
