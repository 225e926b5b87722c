use std::time::Duration;
use futures_util::future::join_all;
use crate::orchestration::StageSummary;
use crate::remote::commands::CaptureCommands;
use crate::remote::{run_remote_command, RemoteExecutor};
use crate::state::{CaptureSession, LaunchStatus, SessionMap};
use crate::target::Target;

/// Start a capture on every target at once and wait for all of them to answer. Every target gets
/// exactly one session back, `Running` or `LaunchFailed`, whatever happened to the others.
pub async fn launch_all<'a>(
    targets: &'a [Target],
    executor: &dyn RemoteExecutor,
    commands: &CaptureCommands,
    timeout: Duration,
) -> SessionMap<'a> {
    let mut sessions: SessionMap<'a> = targets.iter()
        .map(|t| (t.id.clone(), CaptureSession::new(t)))
        .collect();
    if targets.is_empty() {
        return sessions;
    }
    tracing::info!("Stage: starting {} capture sessions", targets.len());

    let launches = targets.iter().map(|target| async move {
        let command = commands.start_capture(target);
        (target.id.as_str(), run_remote_command(executor, target, &command, timeout).await)
    });

    // results are written back here, on the one task that owns the map
    for (id, outcome) in join_all(launches).await {
        let Some(session) = sessions.get_mut(id) else { continue };
        session.launch_status = match outcome {
            Ok(_) => {
                tracing::debug!("capture running on {id}");
                LaunchStatus::Running
            }
            Err(failure) => {
                tracing::warn!("could not start capture on {id}: {failure}");
                LaunchStatus::LaunchFailed { reason: failure.to_string() }
            }
        };
    }

    tracing::info!("launch: {}", launch_summary(&sessions));
    sessions
}

pub fn launch_summary(sessions: &SessionMap) -> StageSummary {
    let mut summary = StageSummary::default();
    for session in sessions.values() {
        match session.launch_status {
            LaunchStatus::Pending => {}
            LaunchStatus::Running => summary.record(true),
            LaunchStatus::LaunchFailed { .. } => summary.record(false),
        }
    }
    summary
}
