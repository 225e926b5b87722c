use std::time::Duration;
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use crate::aws::AwsCli;
use crate::orchestration::CommandError;
use crate::remote::commands::RemoteCommand;
use crate::remote::{RemoteCommandResult, RemoteExecutor};
use crate::target::{Target, TargetKind};
use crate::vec_of_strings;

const SSM_DOCUMENT: &str = "AWS-RunShellScript";

/// ECS exec does not hand back the remote exit status, so task scripts print it on a line of
/// their own
const EXIT_MARKER: &str = "__fleetcap_rc=";

/// Split the exit status printed by the script off its output. `None` if the script never got
/// as far as printing it.
fn take_exit_marker(stdout: &str) -> (Option<i32>, String) {
    let mut code = None;
    let mut rest = Vec::new();
    for line in stdout.lines() {
        match line.trim().strip_prefix(EXIT_MARKER) {
            Some(value) => code = value.trim().parse().ok(),
            None => rest.push(line),
        }
    }
    (code, rest.join("\n"))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct SendCommandResponse {
    command: SentCommand,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct SentCommand {
    command_id: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct CommandInvocation {
    status: String,
    #[serde(default)]
    response_code: Option<i32>,
    #[serde(default)]
    standard_output_content: String,
    #[serde(default)]
    standard_error_content: String,
}

impl CommandInvocation {
    fn is_finished(&self) -> bool {
        !matches!(self.status.as_str(), "Pending" | "InProgress" | "Delayed" | "Cancelling")
    }
}

/// Tasks are reached with ECS exec, instances with SSM Run Command. Either way the rendered
/// command goes through `/bin/sh -c` on the target.
pub struct AwsRemoteExecutor {
    cli: AwsCli,
    poll_interval: Duration,
}

impl AwsRemoteExecutor {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli, poll_interval: Duration::from_secs(2) }
    }

    async fn execute_on_task(&self, target: &Target, script: &str) -> anyhow::Result<RemoteCommandResult> {
        let script = format!("{script}; echo \"{EXIT_MARKER}$?\"");
        let shell = shell_words::join(["/bin/sh", "-c", script.as_str()]);
        let output = self.cli.run_allow_fail(
            &target.region,
            vec_of_strings![
                "ecs", "execute-command",
                "--cluster", target.group,
                "--task", target.id,
                "--command", shell,
                "--interactive",
            ],
        ).await?;
        let (remote_code, stdout) = take_exit_marker(&output.stdout);
        let exit_status = match remote_code {
            Some(code) => Some(code),
            // the session itself failed, or the script was cut off before the marker
            None if output.code != Some(0) => output.code,
            None => None,
        };
        let stderr = if remote_code.is_none() && output.stderr.is_empty() {
            "no exit status came back from the task".to_string()
        } else {
            output.stderr
        };
        Ok(RemoteCommandResult { target_id: target.id.clone(), exit_status, stdout, stderr })
    }

    async fn execute_on_instance(&self, target: &Target, script: &str) -> anyhow::Result<RemoteCommandResult> {
        let parameters = serde_json::json!({ "commands": [script] }).to_string();
        let sent: SendCommandResponse = self.cli.json(
            &target.region,
            vec_of_strings![
                "ssm", "send-command",
                "--instance-ids", target.id,
                "--document-name", SSM_DOCUMENT,
                "--parameters", parameters,
            ],
        ).await.with_context(|| format!("sending command to {}", target.id))?;
        let command_id = sent.command.command_id;
        tracing::debug!("ssm command {command_id} sent to {}", target.id);

        // the caller bounds this loop with its own timeout
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let res = self.cli.run(
                &target.region,
                vec_of_strings!["ssm", "get-command-invocation", "--command-id", command_id, "--instance-id", target.id],
            ).await;
            let stdout = match res {
                Ok(stdout) => stdout,
                // the invocation takes a moment to be registered after send-command returns
                Err(CommandError::Failed { stderr, .. }) if stderr.contains("InvocationDoesNotExist") => continue,
                Err(err) => bail!(err),
            };
            let invocation: CommandInvocation = serde_json::from_str(&stdout)
                .context("parsing output of aws ssm get-command-invocation")?;
            if !invocation.is_finished() {
                continue;
            }
            tracing::debug!("ssm command {command_id} on {} finished as {}", target.id, invocation.status);
            return Ok(RemoteCommandResult {
                target_id: target.id.clone(),
                exit_status: invocation.response_code.or(if invocation.status == "Success" { Some(0) } else { None }),
                stdout: invocation.standard_output_content,
                stderr: if invocation.standard_error_content.is_empty() {
                    format!("ssm status {}", invocation.status)
                } else {
                    invocation.standard_error_content
                },
            });
        }
    }
}

#[async_trait]
impl RemoteExecutor for AwsRemoteExecutor {
    async fn execute(&self, target: &Target, command: &RemoteCommand) -> anyhow::Result<RemoteCommandResult> {
        let script = command.render();
        match target.kind {
            TargetKind::Task => self.execute_on_task(target, &script).await,
            TargetKind::Instance => self.execute_on_instance(target, &script).await,
        }
    }
}
