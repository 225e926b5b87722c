//! Adapters that reach AWS through the `aws` command line tool. The profile and region are passed
//! on every call so nothing depends on the environment the binary was started from.
use std::time::Duration;
use anyhow::Context;
use serde::de::DeserializeOwned;
use crate::orchestration::{run_subprocess_command, run_subprocess_command_allow_fail, CommandError, CommandOutput};
use crate::target::{Target, TargetKind};

pub mod control_plane;
pub mod executor;
pub mod s3;
pub mod sso;

pub const AWS_BINARY: &str = "aws";

#[derive(Debug, Clone)]
pub struct AwsCli {
    binary: String,
    profile: String,
    timeout: Duration,
}

impl AwsCli {
    pub fn new(profile: &str, timeout: Duration) -> Self {
        Self { binary: AWS_BINARY.to_string(), profile: profile.to_string(), timeout }
    }

    /// Use a different executable, tests point this at `echo`
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn args(&self, region: &str, mut args: Vec<String>) -> Vec<String> {
        args.extend(crate::vec_of_strings!["--region", region, "--profile", self.profile, "--output", "json"]);
        args
    }

    /// Run and return stdout, a non-zero exit is an error carrying the cli's stderr
    pub async fn run(&self, region: &str, args: Vec<String>) -> Result<String, CommandError> {
        run_subprocess_command(&self.binary, self.args(region, args), Some(self.timeout)).await
    }

    pub async fn run_allow_fail(&self, region: &str, args: Vec<String>) -> Result<CommandOutput, CommandError> {
        run_subprocess_command_allow_fail(&self.binary, self.args(region, args), Some(self.timeout)).await
    }

    pub async fn json<T: DeserializeOwned>(&self, region: &str, args: Vec<String>) -> anyhow::Result<T> {
        let what = args.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
        let stdout = self.run(region, args).await?;
        serde_json::from_str(&stdout).with_context(|| format!("parsing output of aws {what}"))
    }
}

/// Last path segment of an ARN, `arn:aws:ecs:r:a:task/cluster/abc` gives `abc`
pub fn arn_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// The command an operator runs to get a shell on `target`
pub fn connect_command(target: &Target, profile: &str) -> String {
    let argv: Vec<&str> = match target.kind {
        TargetKind::Task => vec![
            AWS_BINARY, "ecs", "execute-command",
            "--region", &target.region,
            "--profile", profile,
            "--cluster", &target.group,
            "--task", &target.id,
            "--command", "/bin/bash",
            "--interactive",
        ],
        TargetKind::Instance => vec![
            AWS_BINARY, "ssm", "start-session",
            "--target", &target.id,
            "--region", &target.region,
            "--profile", profile,
        ],
    };
    shell_words::join(argv)
}
