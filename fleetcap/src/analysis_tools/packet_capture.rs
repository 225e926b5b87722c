use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use crate::analysis_tools::{MergeTool, Viewer};
use crate::orchestration::run_subprocess_command;

/// `mergecap -w <output> <inputs..>` from the wireshark suite
pub struct Mergecap {
    pub binary: String,
    pub timeout: Duration,
}

#[async_trait]
impl MergeTool for Mergecap {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> anyhow::Result<()> {
        tracing::info!("merging {} capture files into {}", inputs.len(), output.display());
        let mut args = vec!["-w".to_string(), output.to_string_lossy().to_string()];
        args.extend(inputs.iter().map(|p| p.to_string_lossy().to_string()));
        run_subprocess_command(&self.binary, args, Some(self.timeout)).await
            .with_context(|| format!("running {}", self.binary))?;
        Ok(())
    }
}

/// Wireshark, or anything else taking `<file> -Y <display filter>`. The viewer is left running
/// after we exit, we only wait for it to start.
pub struct Wireshark {
    pub binary: String,
}

#[async_trait]
impl Viewer for Wireshark {
    async fn open(&self, artifact: &Path, filter: Option<&str>) -> anyhow::Result<()> {
        let mut command = Command::new(&self.binary);
        command.arg(artifact);
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            command.args(["-Y", filter]);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        tracing::debug!("running viewer: {:?}", command);
        let child = command.spawn()
            .with_context(|| format!("starting {}", self.binary))?;
        tracing::info!("opened {} in {} (pid {:?})", artifact.display(), self.binary, child.id());
        Ok(())
    }
}
