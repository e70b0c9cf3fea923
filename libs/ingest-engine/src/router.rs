use std::time::Duration;

use ingest_api::{Lane, Record};

use crate::error::{BatchWriteError, RouterError};
use crate::lane::{LaneHandle, LaneState};

/// Routes records to the lane matching their priority.
///
/// Holds one producer handle per lane. Cloning a handle is cheap, the router
/// itself is usually shared behind an `Arc`.
#[derive(Debug)]
pub struct Router {
    lanes: [LaneHandle; 3],
    admission_timeout: Duration,
}

impl Router {
    /// `lanes` must be indexed by [`Lane::index`].
    pub(crate) fn new(lanes: [LaneHandle; 3], admission_timeout: Duration) -> Self {
        Self {
            lanes,
            admission_timeout,
        }
    }

    /// Lane a record is routed to.
    pub fn route(record: &Record) -> Lane {
        record.priority()
    }

    pub fn lane(&self, lane: Lane) -> &LaneHandle {
        &self.lanes[lane.index()]
    }

    pub fn lanes(&self) -> &[LaneHandle; 3] {
        &self.lanes
    }

    pub fn admission_timeout(&self) -> Duration {
        self.admission_timeout
    }

    /// True while every lane still admits records.
    pub fn is_accepting(&self) -> bool {
        self.lanes.iter().all(|l| l.state() == LaneState::Running)
    }

    /// Admit one record into its lane's pending buffer.
    ///
    /// Waits at most the admission timeout for channel space. Returns the lane
    /// the record went to.
    pub async fn submit(&self, record: Record) -> Result<Lane, RouterError> {
        let lane = Self::route(&record);
        self.lane(lane).admit(record, self.admission_timeout).await?;
        Ok(lane)
    }

    /// Partition `records` by lane and commit every partition concurrently.
    ///
    /// Each partition is committed as one batch by its lane; a failing lane does
    /// not cancel the others. Returns once every partition has an outcome.
    pub async fn submit_batch(&self, records: Vec<Record>) -> BatchResult {
        let total = records.len();
        let mut partitions: [Partition; 3] = Default::default();
        for (index, record) in records.into_iter().enumerate() {
            let part = &mut partitions[Self::route(&record).index()];
            part.indices.push(index);
            part.records.push(record);
        }

        let [high, medium, low] = partitions;
        let (high, medium, low) = tokio::join!(
            self.write_partition(Lane::High, high),
            self.write_partition(Lane::Medium, medium),
            self.write_partition(Lane::Low, low),
        );

        let lanes: Vec<LaneOutcome> = [high, medium, low].into_iter().flatten().collect();
        let result = BatchResult { total, lanes };
        tracing::debug!(
            total,
            committed = result.committed(),
            failed = result.failed(),
            "batch submitted"
        );
        result
    }

    async fn write_partition(&self, lane: Lane, part: Partition) -> Option<LaneOutcome> {
        if part.records.is_empty() {
            return None;
        }
        let result = self
            .lane(lane)
            .write_batch(part.records, self.admission_timeout)
            .await;
        Some(LaneOutcome {
            lane,
            indices: part.indices,
            result,
        })
    }
}

#[derive(Default)]
struct Partition {
    indices: Vec<usize>,
    records: Vec<Record>,
}

// ═══════════════════════════════════════════════════════════════
//  Batch outcome
// ═══════════════════════════════════════════════════════════════

/// Result of one lane's partition.
#[derive(Debug, Clone)]
pub struct LaneOutcome {
    pub lane: Lane,
    /// Positions of the partition's records in the submitted batch, in order.
    pub indices: Vec<usize>,
    /// Number of records committed (malformed ones are dropped), or the error.
    pub result: Result<usize, BatchWriteError>,
}

impl LaneOutcome {
    pub fn submitted(&self) -> usize {
        self.indices.len()
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-lane outcomes of [`Router::submit_batch`] plus aggregate counts.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub total: usize,
    /// Only lanes that received at least one record, in priority order.
    pub lanes: Vec<LaneOutcome>,
}

impl BatchResult {
    /// Records the sinks accepted.
    pub fn committed(&self) -> usize {
        self.lanes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }

    /// Records belonging to a failed lane.
    pub fn failed(&self) -> usize {
        self.lanes
            .iter()
            .filter(|o| !o.is_ok())
            .map(LaneOutcome::submitted)
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.lanes.iter().all(LaneOutcome::is_ok)
    }

    pub fn lane(&self, lane: Lane) -> Option<&LaneOutcome> {
        self.lanes.iter().find(|o| o.lane == lane)
    }

    /// Outcome of the lane that handled the record at `index`.
    pub fn outcome_for(&self, index: usize) -> Option<&LaneOutcome> {
        self.lanes
            .iter()
            .find(|o| o.indices.binary_search(&index).is_ok())
    }
}
