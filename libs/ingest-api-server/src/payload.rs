use chrono::DateTime;
use serde::Deserialize;

use ingest_api::{Priority, Record};

/// One sensor reading as posted by devices.
///
/// Every field is optional on the wire so that missing fields surface as a
/// [`ReadingError`] instead of a JSON error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorReading {
    /// RFC 3339.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub metric_name: String,
    #[serde(default, alias = "new_value")]
    pub value: f64,
    /// 1 = high, 2 = medium, 3 = low; anything else is medium.
    #[serde(default)]
    pub priority: i64,
    /// Opaque payload, stored as-is.
    #[serde(default)]
    pub data: String,
}

/// Batch request body: `{"data": [...]}`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub data: Vec<SensorReading>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadingError {
    #[error("missing required fields")]
    MissingFields,

    #[error("invalid timestamp format: {0}")]
    InvalidTimestamp(String),
}

/// A reading turned into a routable record.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub record: Record,
    /// Set when the value crossed the alert threshold.
    pub alert: Option<String>,
}

impl SensorReading {
    /// Validate and convert. Values above `alert_threshold` are promoted to
    /// high priority.
    pub fn into_record(self, alert_threshold: f64) -> Result<Accepted, ReadingError> {
        if self.device_id.is_empty() || self.metric_name.is_empty() || self.timestamp.is_empty() {
            return Err(ReadingError::MissingFields);
        }
        let ts = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| ReadingError::InvalidTimestamp(e.to_string()))?;

        let mut priority = Priority::from_level(self.priority);
        let alert = (self.value > alert_threshold).then(|| {
            priority = Priority::High;
            format!("High value alert: {:.2} exceeds threshold", self.value)
        });

        let record = Record::new(ts.timestamp_millis(), self.device_id, self.metric_name, self.value, priority)
            .with_payload(self.data.into_bytes());
        Ok(Accepted { record, alert })
    }
}
