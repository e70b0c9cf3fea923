//! Priority-tiered write buffering.
//!
//! Records are routed by priority into one of three lanes. Each lane buffers
//! records and flushes them to a [`Sink`](ingest_api::Sink) either when the
//! buffer reaches its capacity or when the lane's timer fires, whichever comes
//! first. Commits run on their own tasks; shutdown drains every lane and waits
//! for all outstanding commits.

pub mod buffer;
pub mod config;
pub mod error;
pub mod failure;
pub mod lane;
pub mod lifecycle;
pub mod metrics;
pub mod router;
pub mod status;
pub mod trigger;

pub use config::{EngineConfig, LaneConfig, LanesConfig};
pub use error::{BatchWriteError, CommitError, EngineError, RouterError, ShutdownError};
pub use failure::{FailureHandler, LogFailures};
pub use lane::{LaneHandle, LaneState};
pub use lifecycle::{Engine, EngineHooks};
pub use metrics::{FlushCounts, LaneMetrics, LaneSnapshot};
pub use router::{BatchResult, LaneOutcome, Router};
pub use status::{DeviceStatus, DeviceStatusBoard};
pub use trigger::FlushReason;
