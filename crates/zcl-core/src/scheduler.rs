//! Periodic driver for the reporting engine

use crate::reporting::{ReportingEngine, TickSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Monotonic seconds counter shared by every time-dependent operation
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds since the clock started
    #[must_use]
    pub fn now(&self) -> u32 {
        u32::try_from(self.start.elapsed().as_secs()).unwrap_or(u32::MAX)
    }
}

/// Emitted after every tick that did something
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerEvent {
    pub now: u32,
    pub summary: TickSummary,
}

/// Runs [`ReportingEngine::tick`] on a fixed period until dropped
pub struct ReportingScheduler {
    handle: JoinHandle<()>,
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl ReportingScheduler {
    /// Spawn the tick task on the current runtime
    #[must_use]
    pub fn start(engine: Arc<ReportingEngine>, clock: Clock, period: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let tx = event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let now = clock.now();
                let summary = engine.tick(now);
                if summary != TickSummary::default() {
                    tracing::debug!(
                        "Reporting tick at {}s: {} reports, {} timeouts",
                        now,
                        summary.reports,
                        summary.timeouts
                    );
                    let _ = tx.send(SchedulerEvent { now, summary });
                }
            }
        });

        tracing::info!("Reporting scheduler started (period {:?})", period);
        Self { handle, event_tx }
    }

    /// Subscribe to tick events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ReportingScheduler {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::debug!("Reporting scheduler stopped");
    }
}
