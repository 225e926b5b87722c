use std::fmt;
use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use anyhow::Context;
use serde::Serialize;
use crate::orchestration::StageSummary;
use crate::state::{CaptureSession, LaunchStatus, RunContext, StopStatus};
use crate::target::{Target, TargetKind};

/// How one target fared through the run
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub id: String,
    pub kind: TargetKind,
    pub group: String,
    pub region: String,
    pub launch: LaunchStatus,
    pub stop: StopStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged_remote_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_failure: Option<String>,
}

impl TargetReport {
    fn from_session(session: &CaptureSession) -> Self {
        let Target { id, kind, group, region, .. } = session.target.clone();
        Self {
            id,
            kind,
            group,
            region,
            launch: session.launch_status.clone(),
            stop: session.stop_status.clone(),
            staged_remote_path: session.staged_remote_path.clone(),
            local_path: session.local_path.clone(),
            download_failure: session.download_failure.clone(),
        }
    }

    /// tcpdump may still be running on this target and needs stopping by hand
    pub fn possibly_left_running(&self) -> bool {
        self.launch == LaunchStatus::Running && self.stop != StopStatus::Stopped
    }

    fn collect_column(&self) -> String {
        match (&self.local_path, &self.download_failure) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(reason)) => format!("failed ({reason})"),
            (None, None) => "-".to_string(),
        }
    }
}

fn launch_column(status: &LaunchStatus) -> String {
    match status {
        LaunchStatus::Pending => "pending".to_string(),
        LaunchStatus::Running => "running".to_string(),
        LaunchStatus::LaunchFailed { reason } => format!("failed ({reason})"),
    }
}

fn stop_column(status: &StopStatus) -> String {
    match status {
        StopStatus::NotStopped => "-".to_string(),
        StopStatus::Stopped => "stopped".to_string(),
        StopStatus::StopFailed { reason } => format!("failed ({reason})"),
    }
}

/// Everything the operator needs after a run, including what to clean up by hand
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub profile: String,
    pub environment: String,
    pub service: String,
    pub run_dir: PathBuf,
    pub discovered: usize,
    pub launch: StageSummary,
    pub stop: StageSummary,
    pub collect: StageSummary,
    pub targets: Vec<TargetReport>,
    /// the captures were stopped because the process was interrupted
    pub interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<String>,
}

impl RunReport {
    pub fn from_context(context: &RunContext, discovered: usize) -> Self {
        Self {
            profile: context.profile.clone(),
            environment: context.environment.clone(),
            service: context.service.name(),
            run_dir: context.run_dir.path().to_path_buf(),
            discovered,
            targets: context.sessions.values().map(TargetReport::from_session).collect(),
            ..Default::default()
        }
    }

    /// `discovered/launched/stopped/collected`
    pub fn counts(&self) -> String {
        format!("{}/{}/{}/{}", self.discovered, self.launch.succeeded, self.stop.succeeded, self.collect.succeeded)
    }

    pub fn left_running(&self) -> Vec<&TargetReport> {
        self.targets.iter().filter(|t| t.possibly_left_running()).collect()
    }

    /// Written next to the captures. A run that never downloaded anything has no folder and
    /// gets no report file.
    pub async fn write_json(&self, path: &Path) -> anyhow::Result<bool> {
        let Some(dir) = path.parent() else { return Ok(false) };
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(false);
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await
            .with_context(|| format!("writing run report to {}", path.display()))?;
        Ok(true)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Capture of {} in {} ({})", self.service, self.environment, self.profile)?;
        writeln!(f, "discovered/launched/stopped/collected: {}", self.counts())?;
        if self.interrupted {
            writeln!(f, "the run was interrupted, running captures were stopped early")?;
        }
        for t in &self.targets {
            writeln!(
                f,
                "  {} {} {}/{}  launch: {}  stop: {}  collect: {}",
                t.kind,
                t.id,
                t.region,
                t.group,
                launch_column(&t.launch),
                stop_column(&t.stop),
                t.collect_column(),
            )?;
        }
        for t in self.left_running() {
            writeln!(f, "WARNING: tcpdump may still be running on {} {} ({}/{})", t.kind, t.id, t.region, t.group)?;
        }
        match (&self.merged, &self.merge_error) {
            (Some(path), _) => writeln!(f, "merged capture: {}", path.display())?,
            (None, Some(err)) => writeln!(f, "no merged capture: {err}")?,
            (None, None) => {}
        }
        if let Some(viewer) = &self.viewer {
            writeln!(f, "viewer: {viewer}")?;
        }
        Ok(())
    }
}
