use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::oneshot;
use fleetcap_lib::orchestration::controller::{await_stop_signal, StopReason, StopSignal};

/// Exit status after a second Ctrl-C abandons the clean up
pub const ABANDONED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    /// stop and stage the running captures, then exit
    StopCaptures,
    Exit,
}

/// Only a Ctrl-C while waiting for `stop` leads to a clean stop. Once the operator has stopped
/// the captures, or a stop is already under way, Ctrl-C exits.
fn on_interrupt(operator_stopped: bool, already_interrupted: bool) -> InterruptAction {
    if operator_stopped || already_interrupted {
        InterruptAction::Exit
    } else {
        InterruptAction::StopCaptures
    }
}

/// The stop prompt on the terminal, raced against Ctrl-C. Ctrl-C is watched from the moment this
/// is installed, so one pressed while the captures are still starting is acted on as soon as the
/// run asks whether to stop.
pub struct TerminalStopSignal<R, W> {
    reader: R,
    writer: W,
    interrupted: oneshot::Receiver<()>,
    operator_stopped: Arc<AtomicBool>,
}

impl<R, W> TerminalStopSignal<R, W> {
    pub fn install(reader: R, writer: W) -> Self {
        let (tx, rx) = oneshot::channel();
        let operator_stopped = Arc::new(AtomicBool::new(false));
        let stopped = operator_stopped.clone();
        tokio::spawn(async move {
            let mut tx = Some(tx);
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    tracing::warn!("could not listen for Ctrl-C");
                    return;
                }
                match on_interrupt(stopped.load(Ordering::SeqCst), tx.is_none()) {
                    InterruptAction::StopCaptures => {
                        tracing::warn!("interrupted, stopping the running captures. Press Ctrl-C again to exit straight away");
                        if let Some(tx) = tx.take() {
                            let _ = tx.send(());
                        }
                    }
                    InterruptAction::Exit => {
                        tracing::error!("exiting, tcpdump may still be running on some targets");
                        std::process::exit(ABANDONED_EXIT_CODE);
                    }
                }
            }
        });
        Self { reader, writer, interrupted: rx, operator_stopped }
    }
}

#[async_trait]
impl<R, W> StopSignal for TerminalStopSignal<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn wait(&mut self) -> anyhow::Result<StopReason> {
        tokio::select! {
            Ok(()) = &mut self.interrupted => Ok(StopReason::Interrupted),
            res = await_stop_signal(&mut self.reader, &mut self.writer) => {
                res?;
                self.operator_stopped.store(true, Ordering::SeqCst);
                Ok(StopReason::Operator)
            }
        }
    }
}
