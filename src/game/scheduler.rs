//! Lazily started fixed-period tick scheduler
//!
//! Each game owns one scheduler. It is started when the first participant
//! arrives (pong: when both paddle slots fill) and stopped when the
//! population drains, so an idle namespace burns no timer wakeups.

use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};

/// Fixed-period ticker with an explicit start/stop lifecycle.
///
/// While stopped, `tick()` never resolves, which lets the scheduler sit in a
/// game task's `select!` loop: the command branch stays live and the tick
/// branch is simply dormant. Stopping and restarting does not preserve any
/// notion of elapsed simulation time; physics resume from the last stored
/// state with no catch-up ticks.
pub struct TickScheduler {
    period: Duration,
    interval: Option<Interval>,
}

impl TickScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Begin ticking at the configured period. No-op if already running.
    pub fn start(&mut self) {
        if self.interval.is_none() {
            let mut interval = interval(self.period);
            // Skip missed ticks instead of bursting to catch up; simulation
            // time is tick-counted, not wall-clock-accurate
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.interval = Some(interval);
        }
    }

    /// Cancel the timer. `tick()` becomes pending until the next `start()`.
    pub fn stop(&mut self) {
        self.interval = None;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Complete on the next tick boundary, or never while stopped
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
