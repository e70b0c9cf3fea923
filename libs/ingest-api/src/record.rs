use std::fmt;

use serde::{Deserialize, Serialize};

/// Priority class of a record. Selects the lane that buffers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// All priorities, highest first.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Map a numeric level (1 = high, 2 = medium, 3 = low).
    /// Anything outside the range is normalized to `Medium`.
    pub fn from_level(level: i64) -> Self {
        match level {
            1 => Priority::High,
            3 => Priority::Low,
            _ => Priority::Medium,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    /// Dense index for per-lane arrays.
    pub fn index(self) -> usize {
        self.level() as usize - 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lane is identified by the priority it serves.
pub type Lane = Priority;

/// One sensor observation. Immutable once built: fields are only readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    ts_ms: i64,
    device_id: String,
    metric_name: String,
    value: f64,
    priority: Priority,
    payload: Vec<u8>,
}

impl Record {
    pub fn new(
        ts_ms: i64,
        device_id: impl Into<String>,
        metric_name: impl Into<String>,
        value: f64,
        priority: Priority,
    ) -> Self {
        Self {
            ts_ms,
            device_id: device_id.into(),
            metric_name: metric_name.into(),
            value,
            priority,
            payload: Vec::new(),
        }
    }

    /// Attach an opaque payload. Consumes the record so construction stays one expression.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Observation time, milliseconds since the Unix epoch.
    pub fn ts_ms(&self) -> i64 {
        self.ts_ms
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Check the fields a sink needs. Returns the reason when the record is unusable.
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        if self.device_id.is_empty() {
            return Err(InvalidRecord::MissingField("device_id"));
        }
        if self.metric_name.is_empty() {
            return Err(InvalidRecord::MissingField("metric_name"));
        }
        if !self.value.is_finite() {
            return Err(InvalidRecord::NonFiniteValue(self.value));
        }
        Ok(())
    }
}

/// Why a record was rejected by [`Record::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidRecord {
    MissingField(&'static str),
    NonFiniteValue(f64),
}

impl fmt::Display for InvalidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidRecord::MissingField(name) => write!(f, "missing field '{name}'"),
            InvalidRecord::NonFiniteValue(v) => write!(f, "non-finite value {v}"),
        }
    }
}

impl std::error::Error for InvalidRecord {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_level_normalizes() {
        assert_eq!(Priority::from_level(1), Priority::High);
        assert_eq!(Priority::from_level(2), Priority::Medium);
        assert_eq!(Priority::from_level(3), Priority::Low);
        assert_eq!(Priority::from_level(0), Priority::Medium);
        assert_eq!(Priority::from_level(7), Priority::Medium);
        assert_eq!(Priority::from_level(-1), Priority::Medium);
    }

    #[test]
    fn test_priority_index_is_dense() {
        let idx: Vec<usize> = Priority::ALL.iter().map(|p| p.index()).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn test_record_validate() {
        let ok = Record::new(1, "dev-1", "temp", 21.5, Priority::Low);
        assert!(ok.validate().is_ok());

        let no_device = Record::new(1, "", "temp", 21.5, Priority::Low);
        assert_eq!(no_device.validate(), Err(InvalidRecord::MissingField("device_id")));

        let no_metric = Record::new(1, "dev-1", "", 21.5, Priority::Low);
        assert_eq!(no_metric.validate(), Err(InvalidRecord::MissingField("metric_name")));

        let nan = Record::new(1, "dev-1", "temp", f64::NAN, Priority::Low);
        assert!(matches!(nan.validate(), Err(InvalidRecord::NonFiniteValue(_))));
    }

    #[test]
    fn test_record_payload() {
        let r = Record::new(5, "d", "m", 1.0, Priority::High).with_payload(b"abc".to_vec());
        assert_eq!(r.payload(), b"abc");
        assert_eq!(r.ts_ms(), 5);
    }
}
