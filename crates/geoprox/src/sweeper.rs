//! Background expiry sweeping.
//!
//! Reads already ignore stale points; the sweeper is what keeps churned
//! identities from accumulating forever. It runs
//! [`ProximityIndex::sweep_expired`] on a tokio interval, on the blocking
//! pool so a slow backend never stalls the async workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::index::ProximityIndex;

/// Shortest interval a sweeper will run at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// A handle to stop a running sweeper.
///
/// This is a lightweight, cloneable handle that can be used from any task.
#[derive(Debug, Clone, Default)]
pub struct SweeperHandle {
    stop_signal: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl SweeperHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the sweeper to stop after its current pass.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// What a sweeper did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Completed sweep passes.
    pub passes: u64,
    /// Points removed across all passes.
    pub removed: u64,
    /// Passes that returned an error.
    pub failures: u64,
}

/// Periodic expiry sweeper for a shared index.
#[derive(Debug)]
pub struct Sweeper {
    index: Arc<dyn ProximityIndex>,
    interval: Duration,
    handle: SweeperHandle,
}

impl Sweeper {
    /// Create a sweeper that runs every `interval`.
    ///
    /// Intervals below [`MIN_SWEEP_INTERVAL`], including zero, are raised to
    /// it.
    #[must_use]
    pub fn new(index: Arc<dyn ProximityIndex>, interval: Duration) -> Self {
        Self {
            index,
            interval: interval.max(MIN_SWEEP_INTERVAL),
            handle: SweeperHandle::new(),
        }
    }

    /// Time between sweep passes.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A handle that can stop this sweeper.
    #[must_use]
    pub fn handle(&self) -> SweeperHandle {
        self.handle.clone()
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> (SweeperHandle, JoinHandle<SweepReport>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Run the sweep loop until the handle is stopped.
    ///
    /// The first pass happens one interval after start.
    pub async fn run(self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            "Sweeper started for {} index (every {:?})",
            self.index.backend_name(),
            self.interval
        );

        while !self.handle.should_stop() {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.handle.wake.notified() => {}
            }
            if self.handle.should_stop() {
                break;
            }

            let index = Arc::clone(&self.index);
            match tokio::task::spawn_blocking(move || index.sweep_expired()).await {
                Ok(Ok(removed)) => {
                    report.passes += 1;
                    report.removed += u64::try_from(removed).unwrap_or(u64::MAX);
                    debug!("Sweep pass {} removed {}", report.passes, removed);
                }
                Ok(Err(e)) => {
                    report.failures += 1;
                    warn!("Sweep pass failed: {}", e);
                }
                Err(e) => {
                    report.failures += 1;
                    warn!("Sweep task panicked: {}", e);
                }
            }
        }

        info!(
            "Sweeper stopped after {} passes ({} points removed)",
            report.passes, report.removed
        );
        report
    }
}
