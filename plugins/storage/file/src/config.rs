use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};

use ingest_api::{Record, SinkError};

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_fsync() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FileSinkConfig {
    /// One `{YYYY-MM-DD}.jsonl` file per UTC day lives here.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// `fdatasync` every touched file before a commit is reported done.
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            fsync: default_fsync(),
        }
    }
}

impl FileSinkConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            fsync: default_fsync(),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  On-disk record format
// ════════════════════════════════════════════════════════════════

/// One line of a day file.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct DiskRecord {
    pub ts_ms: i64,
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
    pub device_id: String,
    pub metric_name: String,
    pub value: f64,
    pub priority: u8,
    /// Base64 of the opaque payload, absent when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl DiskRecord {
    pub(crate) fn from_record(record: &Record) -> Result<Self, SinkError> {
        let ts = utc(record.ts_ms())?;
        Ok(Self {
            ts_ms: record.ts_ms(),
            timestamp: ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            device_id: record.device_id().to_string(),
            metric_name: record.metric_name().to_string(),
            value: record.value(),
            priority: record.priority().level(),
            data: (!record.payload().is_empty()).then(|| STANDARD.encode(record.payload())),
        })
    }

    /// Decode the payload back to bytes.
    pub fn payload(&self) -> Result<Vec<u8>, SinkError> {
        match &self.data {
            Some(data) => STANDARD
                .decode(data)
                .map_err(|e| SinkError::format(format!("base64 payload: {e}"))),
            None => Ok(Vec::new()),
        }
    }
}

pub(crate) fn utc(ts_ms: i64) -> Result<DateTime<Utc>, SinkError> {
    DateTime::from_timestamp_millis(ts_ms)
        .ok_or_else(|| SinkError::format(format!("timestamp out of range: {ts_ms}")))
}

/// Partition key of a timestamp: `YYYY-MM-DD` in UTC.
pub fn day_of(ts_ms: i64) -> Result<String, SinkError> {
    Ok(utc(ts_ms)?.format("%Y-%m-%d").to_string())
}
