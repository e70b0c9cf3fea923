use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::LaneConfig;

/// Why a batch left the active buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    /// Buffer reached the lane capacity.
    Size,
    /// Periodic timer tick with a non-empty buffer.
    Timer,
    /// Partition handed in whole through the batch-write path.
    Batch,
    /// Final drain while the lane closes.
    Shutdown,
}

impl FlushReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FlushReason::Size => "size",
            FlushReason::Timer => "timer",
            FlushReason::Batch => "batch",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dual flush trigger of one lane: size threshold plus fixed-period timer.
///
/// Both stimuli only *request* a flush; the lane loop performs the drain, so a
/// trigger that fires after the buffer was already drained sees size 0 and is
/// a no-op.
#[derive(Debug)]
pub struct FlushTrigger {
    capacity: usize,
    period: Duration,
    ticker: Interval,
}

impl FlushTrigger {
    pub fn new(config: &LaneConfig) -> Self {
        let period = config.flush_interval();
        // First tick one full period from now, not immediately.
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            capacity: config.capacity,
            period,
            ticker,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Size trigger, evaluated after every append.
    pub fn on_append(&self, size: usize) -> Option<FlushReason> {
        (size >= self.capacity).then_some(FlushReason::Size)
    }

    /// Timer trigger, evaluated on every tick.
    pub fn on_tick(&self, size: usize) -> Option<FlushReason> {
        (size > 0).then_some(FlushReason::Timer)
    }

    /// Wait for the next timer tick.
    pub async fn tick(&mut self) {
        self.ticker.tick().await;
    }
}
