use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ledger::LedgerError;
use crate::recognition::Frame;

use super::controller::{GateController, GateEvent};

// Set to true to enable per-frame logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub async fn gate_loop(
    gate: GateController,
    mut frames: mpsc::Receiver<Frame>,
    events: mpsc::Sender<GateEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            next = frames.recv() => {
                let Some(frame) = next else {
                    log_info!("frame feed closed");
                    break;
                };

                match gate.process_frame(&frame).await {
                    Ok(Some(event)) => {
                        if let GateEvent::Refused { plate, reason } = &event {
                            log_warn!("refused {plate}: {reason}");
                        }
                        if events.send(event).await.is_err() {
                            log_warn!("gate event receiver dropped; stopping");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(LedgerError::Storage(err)) => {
                        log_error!("gate decision failed, nothing recorded: {err:#}");
                    }
                    Err(err) => log_error!("unexpected gate error: {err}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("gate loop shutting down");
                break;
            }
        }
    }
}

/// Owns the background task that drives a [`GateController`].
pub struct GateWorker {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for GateWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl GateWorker {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub async fn start(
        &mut self,
        gate: GateController,
        frames: mpsc::Receiver<Frame>,
        events: mpsc::Sender<GateEvent>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("gate worker already running");
        }

        info!("Starting gate worker with an empty recognition window");
        gate.reset().await;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(gate_loop(gate, frames, events, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Wait for the loop to finish on its own (feed closed).
    pub async fn join(&mut self) -> Result<()> {
        self.cancel_token = None;
        match self.handle.take() {
            Some(handle) => handle.await.context("gate loop task failed to join"),
            None => Ok(()),
        }
    }

    /// Cancel the loop; frames still queued are discarded.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.join().await
    }
}
