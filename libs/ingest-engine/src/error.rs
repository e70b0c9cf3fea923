use ingest_api::{Lane, Record, SinkError};

use crate::trigger::FlushReason;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),
}

/// Admission failures surfaced to the caller of `submit`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The lane's admission channel stayed full past the bound. Retry with backoff.
    #[error("admission timeout on lane '{lane}'")]
    AdmissionTimeout { lane: Lane },

    /// Shutdown has begun; the lane no longer admits records.
    #[error("lane '{lane}' closed")]
    LaneClosed { lane: Lane },
}

impl RouterError {
    pub fn lane(&self) -> Lane {
        match self {
            RouterError::AdmissionTimeout { lane } | RouterError::LaneClosed { lane } => *lane,
        }
    }
}

/// A sink rejected or failed a batch. The records are gone from the buffering
/// layer; the full batch travels with the error so a caller-supplied policy can
/// retry or persist it elsewhere.
#[derive(Debug, Clone, thiserror::Error)]
#[error("commit of {} records on lane '{lane}' ({reason}) failed: {source}", .batch.len())]
pub struct CommitError {
    pub lane: Lane,
    pub reason: FlushReason,
    pub batch: Vec<Record>,
    pub source: SinkError,
}

/// Outcome of one lane's share of a batch write.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchWriteError {
    #[error(transparent)]
    Admission(#[from] RouterError),

    #[error(transparent)]
    Commit(CommitError),
}

impl BatchWriteError {
    pub fn lane(&self) -> Lane {
        match self {
            BatchWriteError::Admission(e) => e.lane(),
            BatchWriteError::Commit(e) => e.lane,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Lanes that did not reach `Closed` within the allotted time.
    #[error("lanes did not drain in time: {}", display_lanes(.stuck))]
    Timeout { stuck: Vec<Lane> },

    #[error("sink close: {0}")]
    Sink(SinkError),
}

fn display_lanes(lanes: &[Lane]) -> String {
    lanes.iter().map(|l| l.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RouterError::AdmissionTimeout { lane: Lane::High };
        assert_eq!(err.to_string(), "admission timeout on lane 'high'");
        assert_eq!(err.lane(), Lane::High);

        let err = RouterError::LaneClosed { lane: Lane::Low };
        assert_eq!(err.to_string(), "lane 'low' closed");

        let err = ShutdownError::Timeout { stuck: vec![Lane::Medium, Lane::Low] };
        assert_eq!(err.to_string(), "lanes did not drain in time: medium, low");
    }

    #[test]
    fn test_commit_error_carries_batch() {
        let batch = vec![Record::new(1, "d", "m", 1.0, Lane::Low)];
        let err = CommitError {
            lane: Lane::Low,
            reason: FlushReason::Timer,
            batch,
            source: SinkError::io("connection reset"),
        };
        assert_eq!(err.batch.len(), 1);
        assert!(err.to_string().contains("commit of 1 records on lane 'low' (timer)"));
        assert!(err.to_string().contains("connection reset"));
    }
}
