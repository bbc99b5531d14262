//! Heartbeat watchdog
//!
//! A broker session can go silent without the socket ever failing. The
//! watchdog ticks on a fixed period and reports the session stalled when no
//! message has arrived for longer than the configured heartbeat interval.

use crate::transport::mqtt::HealthMonitor;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// How often the watchdog checks for a stall
pub const HEARTBEAT_POLL_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct HeartbeatWatchdog {
    interval: Duration,
    last_message_at: Instant,
    ticker: Interval,
}

impl HeartbeatWatchdog {
    pub fn new(interval: Duration) -> Self {
        Self::with_poll_period(interval, HEARTBEAT_POLL_PERIOD)
    }

    pub fn with_poll_period(interval: Duration, poll_period: Duration) -> Self {
        let poll_period = poll_period.max(Duration::from_millis(1));
        let now = Instant::now();
        let mut ticker = tokio::time::interval_at(now + poll_period, poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            interval,
            last_message_at: now,
            ticker,
        }
    }

    /// Wait for the next check
    pub async fn tick(&mut self) {
        self.ticker.tick().await;
    }

    pub fn record_message(&mut self) {
        self.last_message_at = Instant::now();
    }

    /// Start a fresh silence window, after connecting or reconnecting
    pub fn reset(&mut self) {
        self.last_message_at = Instant::now();
    }

    pub fn is_stalled(&self) -> bool {
        HealthMonitor::is_stalled(self.last_message_at, Instant::now(), self.interval)
    }

    pub fn idle_for(&self) -> Duration {
        self.last_message_at.elapsed()
    }

    pub fn last_message_at(&self) -> Instant {
        self.last_message_at
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
