//! Per-lane counters.
//!
//! Relaxed atomics: values are eventually consistent and meant for the stats
//! endpoint and logs, not for control decisions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use ingest_api::Lane;

use crate::trigger::FlushReason;

#[derive(Debug, Default)]
pub struct LaneMetrics {
    admitted: AtomicU64,
    rejected_timeout: AtomicU64,
    rejected_closed: AtomicU64,
    flush_size: AtomicU64,
    flush_timer: AtomicU64,
    flush_batch: AtomicU64,
    flush_shutdown: AtomicU64,
    records_committed: AtomicU64,
    records_dropped: AtomicU64,
    commits_failed: AtomicU64,
    records_failed: AtomicU64,
    in_flight: AtomicU64,
}

impl LaneMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_admitted(&self, count: u64) {
        self.admitted.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeout(&self) {
        self.rejected_timeout.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_closed(&self, count: u64) {
        self.rejected_closed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush(&self, reason: FlushReason) {
        let counter = match reason {
            FlushReason::Size => &self.flush_size,
            FlushReason::Timer => &self.flush_timer,
            FlushReason::Batch => &self.flush_batch,
            FlushReason::Shutdown => &self.flush_shutdown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_committed(&self, count: u64) {
        self.records_committed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self, count: u64) {
        self.records_dropped.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed(&self, count: u64) {
        self.commits_failed.fetch_add(1, Ordering::Relaxed);
        self.records_failed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn commit_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn commit_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, lane: Lane) -> LaneSnapshot {
        LaneSnapshot {
            lane,
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_timeout: self.rejected_timeout.load(Ordering::Relaxed),
            rejected_closed: self.rejected_closed.load(Ordering::Relaxed),
            flushes: FlushCounts {
                size: self.flush_size.load(Ordering::Relaxed),
                timer: self.flush_timer.load(Ordering::Relaxed),
                batch: self.flush_batch.load(Ordering::Relaxed),
                shutdown: self.flush_shutdown.load(Ordering::Relaxed),
            },
            records_committed: self.records_committed.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            commits_failed: self.commits_failed.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LaneMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneSnapshot {
    pub lane: Lane,
    pub admitted: u64,
    pub rejected_timeout: u64,
    pub rejected_closed: u64,
    pub flushes: FlushCounts,
    pub records_committed: u64,
    pub records_dropped: u64,
    pub commits_failed: u64,
    pub records_failed: u64,
    pub in_flight: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FlushCounts {
    pub size: u64,
    pub timer: u64,
    pub batch: u64,
    pub shutdown: u64,
}

impl FlushCounts {
    pub fn total(&self) -> u64 {
        self.size + self.timer + self.batch + self.shutdown
    }
}
