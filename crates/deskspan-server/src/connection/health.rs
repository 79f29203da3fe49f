//! Periodic client health supervision.
//!
//! A single task probes the connected pool once per second through the
//! desktop manager and prunes unreachable clients as a side effect of the
//! sweep.  When no client answers any more *and* the grace deadline has
//! passed, the task stops itself; every new registration pushes the deadline
//! out so the checker survives the window where the registry is still
//! catching up with a fresh connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
// tokio's Instant, so the deadline honours paused test time.
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::desktop::DesktopHandle;

/// Interval between heartbeat ticks.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Grace granted when the checker starts.
pub const STARTUP_GRACE: Duration = Duration::from_secs(5);

/// Grace granted on every new incoming connection.
pub const REGISTRATION_GRACE: Duration = Duration::from_secs(3);

/// Supervisor for the connected-client pool.
pub struct ClientHealthChecker {
    desktop: DesktopHandle,
    earliest_stop: Arc<Mutex<Instant>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientHealthChecker {
    pub fn new(desktop: DesktopHandle) -> Self {
        Self {
            desktop,
            earliest_stop: Arc::new(Mutex::new(Instant::now())),
            task: Mutex::new(None),
        }
    }

    /// Pushes the stop deadline to `now + grace`.
    pub fn keep_running(&self, grace: Duration) {
        *self.earliest_stop.lock().unwrap() = Instant::now() + grace;
    }

    /// Starts the periodic task.  A no-op while the task is already running.
    pub fn start(&self) {
        let mut guard = self.task.lock().unwrap();
        if let Some(task) = guard.as_ref() {
            if !task.is_finished() {
                return;
            }
        }
        self.keep_running(STARTUP_GRACE);
        let desktop = self.desktop.clone();
        let earliest_stop = Arc::clone(&self.earliest_stop);
        *guard = Some(tokio::spawn(run_checks(desktop, earliest_stop)));
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops the periodic task immediately.  No timer survives this call.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for ClientHealthChecker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_checks(desktop: DesktopHandle, earliest_stop: Arc<Mutex<Instant>>) {
    let mut ticker = tokio::time::interval(CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately; consume it so
    // probes line up with the configured cadence.
    ticker.tick().await;

    let mut pending: Option<oneshot::Receiver<bool>> = None;
    loop {
        ticker.tick().await;

        if let Some(mut probe) = pending.take() {
            match probe.try_recv() {
                // Probe still in flight: skip this tick, never stack probes.
                Err(oneshot::error::TryRecvError::Empty) => {
                    pending = Some(probe);
                    continue;
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    error!("heartbeat probe failed; desktop manager dropped the reply");
                    continue;
                }
                Ok(false) => {
                    let deadline = *earliest_stop.lock().unwrap();
                    if Instant::now() > deadline {
                        debug!("no reachable client and the grace period elapsed; health checker stops");
                        break;
                    }
                }
                Ok(true) => {}
            }
        }

        pending = Some(desktop.heartbeat_sweep_deferred().await);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
