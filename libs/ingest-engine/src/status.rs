use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use ingest_api::{BoxFuture, Record, SinkError, StatusObserver};

pub const DEFAULT_ALERT_THRESHOLD: f64 = 100.0;

/// Last known state of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub metric_name: String,
    pub current_value: f64,
    /// Timestamp of the newest committed record, ms since epoch.
    pub last_update_ms: i64,
    pub alert_count: u64,
    pub records: u64,
}

/// In-memory device status, fed after every successful commit.
///
/// Updates are best-effort and sit outside commit atomicity. Commits of one
/// device may land out of order across lanes, so the current value follows
/// the newest record timestamp rather than arrival order.
#[derive(Debug)]
pub struct DeviceStatusBoard {
    devices: RwLock<HashMap<String, DeviceStatus>>,
    alert_threshold: f64,
}

impl Default for DeviceStatusBoard {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_THRESHOLD)
    }
}

impl DeviceStatusBoard {
    pub fn new(alert_threshold: f64) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            alert_threshold,
        }
    }

    pub fn is_alert(&self, value: f64) -> bool {
        value > self.alert_threshold
    }

    pub fn apply(&self, batch: &[Record]) {
        let mut devices = self.write();
        for record in batch {
            let alert = self.is_alert(record.value());
            let status = devices
                .entry(record.device_id().to_string())
                .or_insert_with(|| DeviceStatus {
                    device_id: record.device_id().to_string(),
                    metric_name: record.metric_name().to_string(),
                    current_value: record.value(),
                    last_update_ms: record.ts_ms(),
                    alert_count: 0,
                    records: 0,
                });
            if record.ts_ms() >= status.last_update_ms {
                status.current_value = record.value();
                status.metric_name = record.metric_name().to_string();
                status.last_update_ms = record.ts_ms();
            }
            status.records += 1;
            if alert {
                status.alert_count += 1;
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceStatus> {
        self.read().get(device_id).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.read().len()
    }

    pub fn total_alerts(&self) -> u64 {
        self.read().values().map(|s| s.alert_count).sum()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DeviceStatus>> {
        match self.devices.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("device status read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DeviceStatus>> {
        match self.devices.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("device status write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl StatusObserver for DeviceStatusBoard {
    fn observe<'a>(&'a self, batch: &'a [Record]) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.apply(batch);
            Ok(())
        })
    }
}
