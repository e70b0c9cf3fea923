use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;

use ingest_api::{BoxFuture, Record, Sink, SinkError};

// ═══════════════════════════════════════════════════════════════
//  MemorySinkConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_batches() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemorySinkConfig {
    /// Oldest batches are evicted beyond this count.
    #[serde(default = "default_max_batches")]
    pub max_batches: usize,
}

impl Default for MemorySinkConfig {
    fn default() -> Self {
        Self {
            max_batches: default_max_batches(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySink
// ═══════════════════════════════════════════════════════════════

/// In-memory sink keeping every committed batch, in commit order.
///
/// Meant for development and tests: it can be switched into a failing mode
/// and given an artificial commit latency.
#[derive(Debug)]
pub struct MemorySink {
    batches: RwLock<VecDeque<Vec<Record>>>,
    max_batches: usize,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    attempts: AtomicU64,
    closed: AtomicBool,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(MemorySinkConfig::default())
    }
}

impl MemorySink {
    pub fn new(config: MemorySinkConfig) -> Self {
        Self {
            batches: RwLock::new(VecDeque::with_capacity(config.max_batches.min(1024))),
            max_batches: config.max_batches.max(1),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Make every following commit fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long inside every commit.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Committed batches, oldest first.
    pub async fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.read().await.iter().cloned().collect()
    }

    /// All committed records, flattened in commit order.
    pub async fn records(&self) -> Vec<Record> {
        self.batches.read().await.iter().flatten().cloned().collect()
    }

    pub async fn batch_count(&self) -> usize {
        self.batches.read().await.len()
    }

    /// Commit calls seen, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn commit<'a>(&'a self, batch: &'a [Record]) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(SinkError::rejected("sink is closed"));
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SinkError::io("memory sink set to fail"));
            }

            let mut buf = self.batches.write().await;
            if buf.len() >= self.max_batches {
                buf.pop_front();
            }
            buf.push_back(batch.to_vec());
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_api::Priority;

    fn rec(i: i64) -> Record {
        Record::new(i, "dev", "m", i as f64, Priority::Low)
    }

    #[tokio::test]
    async fn test_commit_keeps_batches_in_order() {
        let sink = MemorySink::default();
        sink.commit(&[rec(1), rec(2)]).await.unwrap();
        sink.commit(&[rec(3)]).await.unwrap();

        assert_eq!(sink.batch_count().await, 2);
        let ts: Vec<i64> = sink.records().await.iter().map(|r| r.ts_ms()).collect();
        assert_eq!(ts, vec![1, 2, 3]);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn test_failing_mode_persists_nothing() {
        let sink = MemorySink::default();
        sink.set_failing(true);
        let err = sink.commit(&[rec(1)]).await.unwrap_err();
        assert_eq!(err.kind, ingest_api::ErrorKind::Io);
        assert_eq!(sink.batch_count().await, 0);

        sink.set_failing(false);
        sink.commit(&[rec(2)]).await.unwrap();
        assert_eq!(sink.batch_count().await, 1);
    }

    #[tokio::test]
    async fn test_evicts_oldest_batch() {
        let sink = MemorySink::new(MemorySinkConfig { max_batches: 2 });
        for i in 0..3 {
            sink.commit(&[rec(i)]).await.unwrap();
        }
        let batches = sink.batches().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][0].ts_ms(), 1);
    }

    #[tokio::test]
    async fn test_rejects_after_close() {
        let sink = MemorySink::default();
        sink.close().await.unwrap();
        assert!(sink.is_closed());
        assert!(sink.commit(&[rec(1)]).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies() {
        let sink = MemorySink::default();
        sink.set_delay(Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        sink.commit(&[rec(1)]).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
