//! Fixed-interval sync scheduler.
//!
//! Runs the controller on a background thread with its own current-thread
//! runtime. The first cycle starts immediately; after that the next cycle
//! starts `interval` after the previous one finished, or earlier when a
//! manual trigger arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use super::controller::ImageSetController;
use super::policy::CyclePhase;
use super::report::CycleReport;

/// Published after every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum CycleEvent {
    Completed(CycleReport),
    Failed {
        phase: CyclePhase,
        error: String,
        retryable: bool,
    },
}

/// Periodic sync scheduler.
pub struct SyncScheduler {
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    trigger_tx: broadcast::Sender<()>,
    events_tx: broadcast::Sender<CycleEvent>,
}

impl SyncScheduler {
    pub fn new(interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (trigger_tx, _) = broadcast::channel(16);
        let (events_tx, _) = broadcast::channel(64);
        Self {
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            stop_tx,
            trigger_tx,
            events_tx,
        }
    }

    /// Starts the loop on a new thread, taking ownership of the controller.
    pub fn start(&self, mut controller: ImageSetController) -> std::io::Result<JoinHandle<()>> {
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;
        let mut stop_rx = self.stop_tx.subscribe();
        let mut trigger_rx = self.trigger_tx.subscribe();
        let events_tx = self.events_tx.clone();

        std::thread::Builder::new()
            .name("imageset-sync".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to start sync runtime: {}", e);
                        return;
                    }
                };

                rt.block_on(async {
                    let mut phase = CyclePhase::AwaitingFirstSync;
                    let mut triggers_open = true;

                    loop {
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        let event = match controller.run_cycle(phase).await {
                            Ok(report) => {
                                phase = phase.after(true);
                                CycleEvent::Completed(report)
                            }
                            Err(e) => {
                                log::error!("Sync cycle failed: {}", e);
                                CycleEvent::Failed {
                                    phase,
                                    error: e.to_string(),
                                    retryable: e.is_retryable(),
                                }
                            }
                        };
                        if events_tx.send(event).is_err() {
                            log::trace!("No cycle event listeners");
                        }

                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        tokio::select! {
                            _ = tokio::time::sleep(interval) => {},
                            res = trigger_rx.recv(), if triggers_open => match res {
                                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                                    log::info!("Manual sync triggered");
                                }
                                Err(broadcast::error::RecvError::Closed) => {
                                    triggers_open = false;
                                }
                            },
                            res = stop_rx.changed() => {
                                if res.is_err() {
                                    break;
                                }
                            },
                        }
                    }

                    log::info!("Sync scheduler stopped");
                });
            })
    }

    /// Requests an immediate cycle. Returns false if the loop is not running.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.send(()).is_ok()
    }

    /// Subscribes to cycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.events_tx.subscribe()
    }

    /// Signals the loop to stop. An in-flight cycle runs to completion.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.stop_tx.send_replace(true);
    }
}
