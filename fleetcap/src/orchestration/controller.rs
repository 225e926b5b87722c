use std::time::Duration;
use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use fleetcap_schemas::STOP_TOKEN;
use crate::orchestration::StageSummary;
use crate::remote::commands::CaptureCommands;
use crate::remote::{run_remote_command, RemoteExecutor};
use crate::state::{SessionMap, StopStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// the operator typed the stop token
    Operator,
    /// the process is being asked to exit while captures run
    Interrupted,
}

/// Whatever tells the run that the capture window is over
#[async_trait]
pub trait StopSignal: Send {
    async fn wait(&mut self) -> anyhow::Result<StopReason>;
}

/// Prompt on `writer` and read lines from `reader` until one of them is the stop token, ignoring
/// case and surrounding whitespace. There is no timeout, the operator decides how long the
/// capture runs. End of input counts as the token since nothing else can arrive.
pub async fn await_stop_signal<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut line = String::new();
    loop {
        writer.write_all(format!("Type '{STOP_TOKEN}' to stop the captures: ").as_bytes()).await?;
        writer.flush().await?;

        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tracing::warn!("input closed while waiting for '{STOP_TOKEN}', stopping the captures");
            return Ok(());
        }
        if line.trim().eq_ignore_ascii_case(STOP_TOKEN) {
            return Ok(());
        }
        writer.write_all(format!("'{}' is not '{STOP_TOKEN}'\n", line.trim()).as_bytes()).await?;
    }
}

/// Stop signal read from any line based input, stdin in the binary
pub struct PromptStopSignal<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> PromptStopSignal<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

#[async_trait]
impl<R, W> StopSignal for PromptStopSignal<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn wait(&mut self) -> anyhow::Result<StopReason> {
        await_stop_signal(&mut self.reader, &mut self.writer).await?;
        Ok(StopReason::Operator)
    }
}

/// Stop every running capture and stage its file to the bucket. Sessions that never started, or
/// that were already stopped, get no command. One target failing is recorded on its session and
/// the rest carry on.
pub async fn stop_and_stage_all(
    sessions: &mut SessionMap<'_>,
    executor: &dyn RemoteExecutor,
    commands: &CaptureCommands,
    timeout: Duration,
) -> StageSummary {
    let pending: Vec<_> = sessions.values()
        .filter(|s| s.is_running() && s.stop_status == StopStatus::NotStopped)
        .map(|s| s.target)
        .collect();
    let skipped = sessions.len() - pending.len();
    tracing::info!("Stage: stopping {} captures ({skipped} not running)", pending.len());

    let stops = pending.into_iter().map(|target| async move {
        let command = commands.stop_and_stage(target);
        (target, run_remote_command(executor, target, &command, timeout).await)
    });

    let mut summary = StageSummary::default();
    for (target, outcome) in join_all(stops).await {
        let Some(session) = sessions.get_mut(&target.id) else { continue };
        match outcome {
            Ok(_) => {
                session.stop_status = StopStatus::Stopped;
                session.staged_remote_path = Some(commands.staged_path(target));
                summary.record(true);
            }
            Err(failure) => {
                tracing::warn!("could not stop and stage the capture on {}: {failure}", target.id);
                session.stop_status = StopStatus::StopFailed { reason: failure.to_string() };
                summary.record(false);
            }
        }
    }
    tracing::info!("stop and stage: {summary}");
    summary
}
