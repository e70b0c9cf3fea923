use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use ingest_api::{BoxFuture, Record, Sink, SinkError};

use crate::config::{DiskRecord, FileSinkConfig, day_of};

// ════════════════════════════════════════════════════════════════
//  FileSink
// ════════════════════════════════════════════════════════════════

/// JSON-lines sink partitioned by UTC day.
///
/// A batch is serialized completely before anything touches the disk, then
/// appended with one write per day file. Commits are serialized by a lock; if
/// any append fails, files already extended by this batch are truncated back
/// to their previous length so the batch is all-or-nothing.
#[derive(Debug)]
pub struct FileSink {
    data_dir: PathBuf,
    fsync: bool,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

/// File appended by the current batch, kept for rollback.
struct Appended {
    path: PathBuf,
    len_before: u64,
}

impl FileSink {
    /// Create the data directory if missing.
    pub async fn open(config: FileSinkConfig) -> Result<Self, SinkError> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| SinkError::io(format!("mkdir {}: {e}", config.data_dir.display())))?;
        tracing::info!(data_dir = %config.data_dir.display(), fsync = config.fsync, "file sink ready");
        Ok(Self {
            data_dir: config.data_dir,
            fsync: config.fsync,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Day file a record with this timestamp lands in.
    pub fn partition_path(&self, ts_ms: i64) -> Result<PathBuf, SinkError> {
        Ok(self.day_path(&day_of(ts_ms)?))
    }

    fn day_path(&self, day: &str) -> PathBuf {
        self.data_dir.join(format!("{day}.jsonl"))
    }

    /// Serialize the batch into one buffer per day, preserving batch order.
    fn encode(&self, batch: &[Record]) -> Result<BTreeMap<String, Vec<u8>>, SinkError> {
        let mut days: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for record in batch {
            let line = DiskRecord::from_record(record)?;
            let buf = days.entry(day_of(record.ts_ms())?).or_default();
            serde_json::to_writer(&mut *buf, &line)?;
            buf.push(b'\n');
        }
        Ok(days)
    }

    async fn do_commit(&self, batch: &[Record]) -> Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkError::rejected("file sink is closed"));
        }
        let days = self.encode(batch)?;

        let _guard = self.write_lock.lock().await;
        let mut appended: Vec<Appended> = Vec::with_capacity(days.len());
        for (day, buf) in &days {
            let path = self.day_path(day);
            if let Err(e) = self.append(&path, buf, &mut appended).await {
                self.rollback(&appended).await;
                return Err(e.with_context(path.display()));
            }
        }
        Ok(())
    }

    async fn append(&self, path: &Path, buf: &[u8], appended: &mut Vec<Appended>) -> Result<(), SinkError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        let len_before = file.metadata().await?.len();
        appended.push(Appended {
            path: path.to_path_buf(),
            len_before,
        });
        file.write_all(buf).await?;
        file.flush().await?;
        if self.fsync {
            file.sync_data().await?;
        }
        Ok(())
    }

    async fn rollback(&self, appended: &[Appended]) {
        for entry in appended {
            let result = async {
                let file = OpenOptions::new().write(true).open(&entry.path).await?;
                file.set_len(entry.len_before).await?;
                if self.fsync {
                    file.sync_data().await?;
                }
                Ok::<(), std::io::Error>(())
            }
            .await;
            if let Err(e) = result {
                tracing::error!(path = %entry.path.display(), error = %e, "rollback of partial batch failed");
            }
        }
    }

    /// Read back every record of one day file, in file order.
    pub async fn read_day(&self, day: &str) -> Result<Vec<DiskRecord>, SinkError> {
        let path = self.day_path(day);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SinkError::from(e).with_context(path.display())),
        };
        content
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_str(l).map_err(SinkError::from))
            .collect()
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn commit<'a>(&'a self, batch: &'a [Record]) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(self.do_commit(batch))
    }

    fn close(&self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            // Wait for a commit that may still hold the lock.
            let _guard = self.write_lock.lock().await;
            tracing::info!(data_dir = %self.data_dir.display(), "file sink closed");
            Ok(())
        })
    }
}
