//! JSON-lines file sink.
//!
//! Layout: `{data_dir}/{YYYY-MM-DD}.jsonl`, one line per record, days in UTC.

mod config;
mod sink;

pub use config::{DiskRecord, FileSinkConfig, day_of};
pub use sink::FileSink;
