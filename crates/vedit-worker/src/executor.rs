//! Background worker loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::batch::BatchExportOrchestrator;
use crate::error::WorkerResult;

/// Drains the orchestrator on a fixed interval until shut down.
pub struct BatchWorker {
    orchestrator: Arc<BatchExportOrchestrator>,
    poll_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
    stop_when_idle: bool,
}

impl BatchWorker {
    /// `shutdown_rx` flipping to `true` stops the loop after the job in
    /// flight, if any.
    pub fn new(
        orchestrator: Arc<BatchExportOrchestrator>,
        poll_interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            orchestrator,
            poll_interval,
            shutdown_rx,
            stop_when_idle: false,
        }
    }

    /// Also stop once no pending job is left, for batches nothing else
    /// feeds.
    pub fn stop_when_idle(mut self) -> Self {
        self.stop_when_idle = true;
        self
    }

    pub fn orchestrator(&self) -> &Arc<BatchExportOrchestrator> {
        &self.orchestrator
    }

    /// Run until shutdown, or until idle when configured to.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Starting batch worker");

        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // A dropped sender also means shutdown
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping worker");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.drain().await;
                    if self.stop_when_idle && self.orchestrator.pending_count() == 0 {
                        info!("Batch drained, stopping worker");
                        break;
                    }
                }
            }
        }

        info!("Batch worker stopped");
        Ok(())
    }

    /// Render pending jobs one by one, checking for shutdown between jobs.
    async fn drain(&self) {
        while !*self.shutdown_rx.borrow() {
            match self.orchestrator.tick().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Batch tick failed");
                    break;
                }
            }
        }
    }
}
