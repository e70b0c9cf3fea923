//! Lane writer: one control loop per priority lane.
//!
//! The loop is the only owner of the lane's [`BatchBuffer`]; producers reach it
//! exclusively through the bounded admission channel. Admissions, timer ticks
//! and the shutdown signal are serviced one at a time, and every flush is
//! handed to a separate commit task so sink I/O never stalls the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use ingest_api::{Lane, Record, Sink, StatusObserver};

use crate::buffer::BatchBuffer;
use crate::config::LaneConfig;
use crate::error::{BatchWriteError, CommitError, RouterError};
use crate::failure::FailureHandler;
use crate::metrics::LaneMetrics;
use crate::trigger::{FlushReason, FlushTrigger};

/// Lifecycle of a lane writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneState {
    Running,
    /// Admission closed, remaining records being committed.
    Draining,
    /// Terminal.
    Closed,
}

type CommitReply = oneshot::Sender<Result<usize, CommitError>>;

enum LaneCommand {
    Admit(Record),
    /// A whole partition committed as one batch, outcome reported back.
    WriteBatch { records: Vec<Record>, reply: CommitReply },
}

// ═══════════════════════════════════════════════════════════════
//  Commit context: shared by the loop and every commit task
// ═══════════════════════════════════════════════════════════════

#[derive(Clone)]
pub(crate) struct CommitContext {
    pub lane: Lane,
    pub sink: Arc<dyn Sink>,
    pub observer: Option<Arc<dyn StatusObserver>>,
    pub failures: Arc<dyn FailureHandler>,
    pub metrics: Arc<LaneMetrics>,
}

impl CommitContext {
    /// Validate, commit, notify the observer. Returns the number of committed records.
    async fn commit(&self, batch: Vec<Record>, reason: FlushReason) -> Result<usize, CommitError> {
        let total = batch.len();
        let mut valid = Vec::with_capacity(total);
        for record in batch {
            match record.validate() {
                Ok(()) => valid.push(record),
                Err(e) => {
                    tracing::warn!(
                        lane = %self.lane,
                        device_id = %record.device_id(),
                        reason = %e,
                        "dropping malformed record"
                    );
                    self.metrics.record_dropped(1);
                }
            }
        }
        if valid.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        self.metrics.commit_started();
        let result = self.sink.commit(&valid).await;
        self.metrics.commit_finished();

        if let Err(source) = result {
            self.metrics.record_failed(valid.len() as u64);
            return Err(CommitError {
                lane: self.lane,
                reason,
                batch: valid,
                source,
            });
        }

        let elapsed = start.elapsed();
        self.metrics.record_committed(valid.len() as u64);
        tracing::debug!(
            lane = %self.lane,
            reason = %reason,
            batch_size = valid.len(),
            dropped = total - valid.len(),
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            rate = valid.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
            sink = %self.sink.name(),
            "batch committed"
        );

        if let Some(observer) = &self.observer {
            if let Err(e) = observer.observe(&valid).await {
                tracing::warn!(lane = %self.lane, error = %e, "status update failed");
            }
        }
        Ok(valid.len())
    }
}

// ═══════════════════════════════════════════════════════════════
//  LaneHandle: producer side
// ═══════════════════════════════════════════════════════════════

/// Cloneable producer handle of one lane.
#[derive(Clone)]
pub struct LaneHandle {
    lane: Lane,
    tx: mpsc::Sender<LaneCommand>,
    state: watch::Receiver<LaneState>,
    metrics: Arc<LaneMetrics>,
}

impl std::fmt::Debug for LaneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneHandle")
            .field("lane", &self.lane)
            .field("state", &self.state())
            .finish()
    }
}

impl LaneHandle {
    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn state(&self) -> LaneState {
        *self.state.borrow()
    }

    pub fn metrics(&self) -> &Arc<LaneMetrics> {
        &self.metrics
    }

    /// Admit one record, waiting at most `timeout` for channel space.
    pub async fn admit(&self, record: Record, timeout: Duration) -> Result<(), RouterError> {
        self.send(LaneCommand::Admit(record), 1, timeout).await
    }

    /// Commit `records` as one batch through the lane and wait for the outcome.
    /// Admission is bounded by `timeout`; the commit itself is not.
    pub async fn write_batch(
        &self,
        records: Vec<Record>,
        timeout: Duration,
    ) -> Result<usize, BatchWriteError> {
        if records.is_empty() {
            return Ok(0);
        }
        let count = records.len() as u64;
        let (reply, outcome) = oneshot::channel();
        self.send(LaneCommand::WriteBatch { records, reply }, count, timeout)
            .await?;
        match outcome.await {
            Ok(result) => result.map_err(BatchWriteError::Commit),
            // Loop went away without answering.
            Err(_) => Err(BatchWriteError::Admission(RouterError::LaneClosed { lane: self.lane })),
        }
    }

    async fn send(&self, cmd: LaneCommand, count: u64, timeout: Duration) -> Result<(), RouterError> {
        if self.state() != LaneState::Running {
            self.metrics.record_closed(count);
            return Err(RouterError::LaneClosed { lane: self.lane });
        }
        match self.tx.send_timeout(cmd, timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                self.metrics.record_timeout();
                tracing::debug!(lane = %self.lane, timeout_ms = timeout.as_millis() as u64, "admission timeout");
                Err(RouterError::AdmissionTimeout { lane: self.lane })
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                self.metrics.record_closed(count);
                Err(RouterError::LaneClosed { lane: self.lane })
            }
        }
    }

    /// Resolve once the lane reached [`LaneState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // Sender dropped means the loop is gone: nothing left to wait for.
        let _ = state.wait_for(|s| *s == LaneState::Closed).await;
    }
}

// ═══════════════════════════════════════════════════════════════
//  LaneWriter: control loop
// ═══════════════════════════════════════════════════════════════

pub(crate) struct LaneWriter {
    config: LaneConfig,
    buffer: BatchBuffer,
    ctx: CommitContext,
    commits: TaskTracker,
    state: watch::Sender<LaneState>,
}

impl LaneWriter {
    /// Spawn the control loop of one lane.
    ///
    /// `shutdown` is the lane's own token (usually a child of the engine token).
    pub(crate) fn spawn(
        config: LaneConfig,
        channel_depth: usize,
        ctx: CommitContext,
        shutdown: CancellationToken,
    ) -> (LaneHandle, JoinHandle<()>) {
        let lane = ctx.lane;
        let (tx, rx) = mpsc::channel(channel_depth.max(1));
        let (state_tx, state_rx) = watch::channel(LaneState::Running);

        let handle = LaneHandle {
            lane,
            tx,
            state: state_rx,
            metrics: ctx.metrics.clone(),
        };

        let writer = LaneWriter {
            config,
            buffer: BatchBuffer::new(config.capacity),
            ctx,
            commits: TaskTracker::new(),
            state: state_tx,
        };

        let span = tracing::info_span!("lane", lane = %lane);
        let task = tokio::spawn(writer.run(rx, shutdown).instrument(span));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<LaneCommand>, shutdown: CancellationToken) {
        let mut trigger = FlushTrigger::new(&self.config);
        tracing::info!(
            capacity = self.config.capacity,
            flush_interval_ms = self.config.flush_interval_ms,
            "lane running"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd, &trigger),
                    None => break,
                },
                _ = trigger.tick() => {
                    if let Some(reason) = trigger.on_tick(self.buffer.size()) {
                        self.flush(reason);
                    }
                }
            }
        }

        self.drain(rx, &trigger).await;
    }

    fn handle(&mut self, cmd: LaneCommand, trigger: &FlushTrigger) {
        match cmd {
            LaneCommand::Admit(record) => {
                self.ctx.metrics.record_admitted(1);
                self.buffer.append(record);
                if let Some(reason) = trigger.on_append(self.buffer.size()) {
                    self.flush(reason);
                }
            }
            LaneCommand::WriteBatch { records, reply } => {
                self.ctx.metrics.record_admitted(records.len() as u64);
                self.dispatch(records, FlushReason::Batch, Some(reply));
            }
        }
    }

    /// Swap the active buffer out and commit it on its own task.
    fn flush(&mut self, reason: FlushReason) {
        let batch = self.buffer.drain_and_reset();
        if batch.is_empty() {
            return;
        }
        self.dispatch(batch, reason, None);
    }

    fn dispatch(&self, batch: Vec<Record>, reason: FlushReason, reply: Option<CommitReply>) {
        self.ctx.metrics.record_flush(reason);
        tracing::trace!(reason = %reason, records = batch.len(), "dispatching commit");
        let ctx = self.ctx.clone();
        self.commits.spawn(
            async move {
                let outcome = ctx.commit(batch, reason).await;
                match reply {
                    Some(reply) => {
                        if let Err(Err(failure)) = reply.send(outcome) {
                            // Caller stopped waiting; the failure still needs an owner.
                            ctx.failures.handle(failure);
                        }
                    }
                    None => {
                        if let Err(failure) = outcome {
                            ctx.failures.handle(failure);
                        }
                    }
                }
            }
            .in_current_span(),
        );
    }

    /// Stop admitting, commit what is left, wait for in-flight commits.
    async fn drain(mut self, mut rx: mpsc::Receiver<LaneCommand>, trigger: &FlushTrigger) {
        self.state.send_replace(LaneState::Draining);
        rx.close();

        // Commands accepted before the close are honoured.
        let mut late = 0usize;
        while let Some(cmd) = rx.recv().await {
            late += 1;
            self.handle(cmd, trigger);
        }

        let batch = self.buffer.drain_and_reset();
        let remaining = batch.len();
        tracing::info!(remaining, late_commands = late, in_flight = self.commits.len(), "lane draining");

        if !batch.is_empty() {
            self.ctx.metrics.record_flush(FlushReason::Shutdown);
            if let Err(failure) = self.ctx.commit(batch, FlushReason::Shutdown).await {
                self.ctx.failures.handle(failure);
            }
        }

        self.commits.close();
        self.commits.wait().await;
        self.state.send_replace(LaneState::Closed);
        tracing::info!("lane closed");
    }
}
