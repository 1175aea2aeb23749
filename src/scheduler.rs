use crate::engine::ReplenishmentEngine;
use crate::types::Identity;
use crate::types::events::RotationEvent;
use log::{debug, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

// A refresh pass runs roughly twice a day, jittered so a fleet of clients
// does not hit the directory service in lockstep.
const REFRESH_INTERVAL_MIN: Duration = Duration::from_secs(11 * 60 * 60);
const REFRESH_INTERVAL_MAX: Duration = Duration::from_secs(13 * 60 * 60);

/// Drives the engine on a cadence and fans outcomes out to alerting and
/// retry-backoff collaborators.
///
/// Each cycle runs the engine for every identity sequentially, and this loop
/// is the engine's only caller, which is what guarantees at most one run in
/// flight per identity.
pub struct ReplenishmentScheduler {
    engine: Arc<ReplenishmentEngine>,
    identities: Vec<Identity>,
    refresh_notify: Arc<Notify>,
    shutdown_notify: Arc<Notify>,
    events: mpsc::UnboundedSender<RotationEvent>,
}

impl ReplenishmentScheduler {
    pub fn new(
        engine: Arc<ReplenishmentEngine>,
        identities: Vec<Identity>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RotationEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            engine,
            identities,
            refresh_notify: Arc::new(Notify::new()),
            shutdown_notify: Arc::new(Notify::new()),
            events,
        });
        (scheduler, events_rx)
    }

    /// Handle for collaborators that learn out-of-band that keys are running
    /// low (e.g. the directory says so while delivering messages). A nudge
    /// starts the next pass early.
    pub fn refresh_handle(&self) -> Arc<Notify> {
        self.refresh_notify.clone()
    }

    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown_notify.clone()
    }

    /// The main refresh loop. Runs one pass immediately, then once per
    /// jittered interval or refresh nudge. Spawn as a background task.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.run_cycle().await;

            let interval_ms = rand::rng()
                .random_range(REFRESH_INTERVAL_MIN.as_millis()..=REFRESH_INTERVAL_MAX.as_millis());
            let interval = Duration::from_millis(interval_ms as u64);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.refresh_notify.notified() => {
                    debug!(target: "PreKeys/Scheduler", "refresh requested, starting early pass");
                }
                _ = self.shutdown_notify.notified() => {
                    debug!(target: "PreKeys/Scheduler", "shutdown signaled, exiting refresh loop");
                    return;
                }
            }
        }
    }

    async fn run_cycle(&self) {
        for &identity in &self.identities {
            match self.engine.run(identity).await {
                Ok(()) => {
                    let _ = self.events.send(RotationEvent::Succeeded { identity });
                }
                Err(error) => {
                    let reportable = error.should_alert();
                    if reportable {
                        warn!(target: "PreKeys/Scheduler", "{identity} key refresh failed: {error}");
                    } else {
                        debug!(target: "PreKeys/Scheduler", "{identity} key refresh failed (not reportable): {error}");
                    }
                    let _ = self.events.send(RotationEvent::Failed {
                        identity,
                        reportable,
                        error,
                    });
                }
            }
        }
    }
}
