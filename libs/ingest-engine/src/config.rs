use std::time::Duration;

use serde::Deserialize;

use ingest_api::Lane;

use crate::error::EngineError;

/// Base batch size the per-lane defaults are derived from.
const BASE_CAPACITY: usize = 100;

/// Largest accepted lane capacity; the buffer is preallocated to it.
pub const MAX_LANE_CAPACITY: usize = 1_000_000;

/// Largest accepted admission channel depth (capacity × factor).
pub const MAX_CHANNEL_DEPTH: usize = 1 << 24;

/// Engine configuration, usually the `[engine]` table of the server TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-lane capacity and flush interval.
    pub lanes: LanesConfig,
    /// Upper bound a single `submit` waits for admission channel space.
    pub admission_timeout_ms: u64,
    /// Upper bound for draining all lanes on shutdown.
    pub shutdown_timeout_ms: u64,
    /// Admission channel depth = lane capacity × factor.
    pub channel_factor: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lanes: LanesConfig::default(),
            admission_timeout_ms: 100,
            shutdown_timeout_ms: 30_000,
            channel_factor: 10,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Admission channel depth for a lane.
    pub fn channel_depth(&self, lane: Lane) -> usize {
        self.lanes.get(lane).capacity.saturating_mul(self.channel_factor)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for lane in Lane::ALL {
            self.lanes
                .get(lane)
                .validate()
                .map_err(|e| EngineError::Config(format!("lane '{lane}': {e}")))?;
        }
        if self.channel_factor == 0 {
            return Err(EngineError::Config("channel_factor must be positive".into()));
        }
        for lane in Lane::ALL {
            let depth = self.channel_depth(lane);
            if depth > MAX_CHANNEL_DEPTH {
                return Err(EngineError::Config(format!(
                    "lane '{lane}': channel depth {depth} exceeds {MAX_CHANNEL_DEPTH} (capacity × channel_factor)"
                )));
            }
        }
        if self.admission_timeout_ms == 0 {
            return Err(EngineError::Config("admission_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Capacity and flush interval of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LaneConfig {
    /// Buffer size that triggers an immediate flush.
    pub capacity: usize,
    /// Period of the timer flush.
    pub flush_interval_ms: u64,
}

impl LaneConfig {
    pub fn new(capacity: usize, flush_interval: Duration) -> Self {
        Self {
            capacity,
            flush_interval_ms: flush_interval.as_millis() as u64,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be positive".into());
        }
        if self.capacity > MAX_LANE_CAPACITY {
            return Err(format!("capacity must not exceed {MAX_LANE_CAPACITY}"));
        }
        if self.flush_interval_ms == 0 {
            return Err("flush_interval_ms must be positive".into());
        }
        Ok(())
    }
}

/// Lane set. Higher priority favours latency (small batch, short interval),
/// lower priority favours throughput (large batch, long interval).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LanesConfig {
    pub high: LaneConfig,
    pub medium: LaneConfig,
    pub low: LaneConfig,
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            high: LaneConfig::new(BASE_CAPACITY / 2, Duration::from_millis(100)),
            medium: LaneConfig::new(BASE_CAPACITY, Duration::from_millis(500)),
            low: LaneConfig::new(BASE_CAPACITY * 2, Duration::from_secs(2)),
        }
    }
}

impl LanesConfig {
    /// Same capacity and interval on every lane.
    pub fn uniform(lane: LaneConfig) -> Self {
        Self {
            high: lane,
            medium: lane,
            low: lane,
        }
    }

    pub fn get(&self, lane: Lane) -> &LaneConfig {
        match lane {
            Lane::High => &self.high,
            Lane::Medium => &self.medium,
            Lane::Low => &self.low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_priority_convention() {
        let cfg = EngineConfig::default();
        assert!(cfg.lanes.high.capacity < cfg.lanes.medium.capacity);
        assert!(cfg.lanes.medium.capacity < cfg.lanes.low.capacity);
        assert!(cfg.lanes.high.flush_interval() < cfg.lanes.medium.flush_interval());
        assert!(cfg.lanes.medium.flush_interval() < cfg.lanes.low.flush_interval());
        assert_eq!(cfg.channel_depth(Lane::Medium), 1000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml_keeps_defaults() {
        let cfg = EngineConfig::parse(
            r#"
            admission_timeout_ms = 250

            [lanes.high]
            capacity = 3
            flush_interval_ms = 10000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.admission_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.lanes.high, LaneConfig::new(3, Duration::from_secs(10)));
        assert_eq!(cfg.lanes.low, LanesConfig::default().low);
        assert_eq!(cfg.shutdown_timeout_ms, 30_000);
    }

    #[test]
    fn test_parse_rejects_zero_capacity() {
        let err = EngineConfig::parse(
            r#"
            [lanes.low]
            capacity = 0
            flush_interval_ms = 100
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("lane 'low'"));
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn test_parse_rejects_zero_interval() {
        let err = EngineConfig::parse(
            r#"
            [lanes.medium]
            capacity = 10
            flush_interval_ms = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("flush_interval_ms"));
    }

    #[test]
    fn test_rejects_oversized_lanes() {
        let cfg = EngineConfig {
            lanes: LanesConfig::uniform(LaneConfig::new(usize::MAX / 2, Duration::from_millis(10))),
            ..EngineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("capacity must not exceed"));

        let cfg = EngineConfig {
            lanes: LanesConfig::uniform(LaneConfig::new(MAX_LANE_CAPACITY, Duration::from_millis(10))),
            channel_factor: usize::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.channel_depth(Lane::High), usize::MAX);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("channel depth"));

        let cfg = EngineConfig {
            lanes: LanesConfig::uniform(LaneConfig::new(MAX_LANE_CAPACITY, Duration::from_millis(10))),
            channel_factor: MAX_CHANNEL_DEPTH / MAX_LANE_CAPACITY,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_unknown_syntax() {
        assert!(EngineConfig::parse("lanes = 5").is_err());
    }
}
