//! Periodic trigger for sync cycles.
//!
//! A single tokio interval drives the orchestrator. Every tick attempts a
//! cycle on the blocking thread pool; if the previous cycle is still in
//! flight the trigger is skipped entirely — never queued. The first tick
//! fires immediately, so a freshly started daemon syncs right away.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::SyncOrchestrator;

/// Schedules sync cycles at a fixed interval.
pub struct SyncDaemon {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
}

impl SyncDaemon {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run until shutdown is signalled.
    ///
    /// A cycle in flight at shutdown is not awaited; its network
    /// operations abort through the cancellation token threaded into the
    /// clients, and a half-downloaded scratch file is cleaned up on the
    /// next start.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "sync daemon starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("sync daemon shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    tokio::task::spawn_blocking(move || {
                        match orchestrator.run_cycle_guarded() {
                            None => {
                                warn!("previous sync cycle still running, skipping this trigger");
                            }
                            Some(Ok(())) => {
                                info!("sync cycle finished");
                            }
                            Some(Err(e)) => {
                                error!(error = %e, "sync cycle finished with errors");
                            }
                        }
                    });
                }
            }
        }
    }
}
