//! Simulation clock.
//!
//! Tick `n` (1-based) happens at `start + (n - 1) * tick_interval` in
//! simulated time. The mapping is pure so replayed ticks get the same commit
//! timestamps. Pacing against real time is separate: [`TickPacer`] either
//! runs ticks back to back ([`ClockMode::Accelerated`]) or spaces them out in
//! wall-clock time ([`ClockMode::WallClock`]).

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

fn default_speedup() -> f64 {
    1.0
}

/// How ticks are paced against real time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClockMode {
    /// Run ticks as fast as the pipeline allows
    #[default]
    Accelerated,
    /// Space ticks `tick_interval / speedup` apart in real time
    WallClock {
        #[serde(default = "default_speedup")]
        speedup: f64,
    },
}

/// Maps ticks to simulated timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    start: DateTime<Utc>,
    tick_interval: Duration,
}

impl SimulationClock {
    /// Create a clock starting at `start` (truncated to microseconds).
    pub fn new(start: DateTime<Utc>, tick_interval: Duration) -> Self {
        Self {
            start: truncate_to_micros(start),
            tick_interval,
        }
    }

    /// Simulated time of tick 1.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Simulated duration of one tick.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Commit timestamp of a tick, at microsecond precision.
    pub fn commit_ts(&self, tick: u64) -> DateTime<Utc> {
        let elapsed_micros = (self.tick_interval.as_micros())
            .saturating_mul(u128::from(tick.saturating_sub(1)))
            .min(i64::MAX as u128) as i64;
        self.start
            .checked_add_signed(TimeDelta::microseconds(elapsed_micros))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Truncate a timestamp to whole microseconds.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Spaces ticks out in real time.
#[derive(Debug)]
pub struct TickPacer {
    mode: ClockMode,
    tick_interval: Duration,
    origin: Option<(Instant, u64)>,
}

impl TickPacer {
    /// Create a pacer for the given mode.
    pub fn new(mode: ClockMode, tick_interval: Duration) -> Self {
        Self {
            mode,
            tick_interval,
            origin: None,
        }
    }

    /// Wait until `tick` is due.
    ///
    /// The first tick waited for is due immediately and anchors the
    /// schedule, so a resumed run does not wait out the replayed ticks.
    pub async fn wait_for_tick(&mut self, tick: u64) {
        match self.mode {
            ClockMode::Accelerated => tokio::task::yield_now().await,
            ClockMode::WallClock { speedup } => {
                let (origin, origin_tick) = *self.origin.get_or_insert((Instant::now(), tick));
                let ticks = tick.saturating_sub(origin_tick) as f64;
                let speedup = if speedup > 0.0 { speedup } else { 1.0 };
                let offset = self.tick_interval.mul_f64(ticks / speedup);
                tokio::time::sleep_until(origin + offset).await;
            }
        }
    }
}
