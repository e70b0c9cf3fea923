use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ingest_api::{Lane, Sink, StatusObserver};

use crate::config::EngineConfig;
use crate::error::{EngineError, ShutdownError};
use crate::failure::{FailureHandler, LogFailures};
use crate::lane::{CommitContext, LaneHandle, LaneState, LaneWriter};
use crate::metrics::{LaneMetrics, LaneSnapshot};
use crate::router::Router;

/// Optional collaborators of the engine.
#[derive(Clone)]
pub struct EngineHooks {
    /// Receives every failed commit. Defaults to [`LogFailures`].
    pub failures: Arc<dyn FailureHandler>,
    /// Notified after every successful commit (best-effort).
    pub observer: Option<Arc<dyn StatusObserver>>,
}

impl Default for EngineHooks {
    fn default() -> Self {
        Self {
            failures: Arc::new(LogFailures),
            observer: None,
        }
    }
}

/// Join handle of one lane loop.
struct LaneSlot {
    lane: Lane,
    handle: JoinHandle<()>,
}

/// Shutdown progress, guarded so concurrent callers run one at a time.
struct Teardown {
    /// Emptied once every lane is closed and joined.
    slots: Vec<LaneSlot>,
    /// Set once the sink closed successfully.
    released: bool,
}

/// The running engine: three lane writers behind a router, plus the sink.
pub struct Engine {
    router: Arc<Router>,
    sink: Arc<dyn Sink>,
    shutdown: CancellationToken,
    teardown: tokio::sync::Mutex<Teardown>,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("router", &self.router)
            .field("sink", &self.sink.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Engine {
    /// Validate the configuration and spawn one writer loop per lane.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: EngineConfig,
        sink: Arc<dyn Sink>,
        hooks: EngineHooks,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let mut slots = Vec::with_capacity(Lane::ALL.len());
        let mut handles: Vec<LaneHandle> = Vec::with_capacity(Lane::ALL.len());

        for lane in Lane::ALL {
            let ctx = CommitContext {
                lane,
                sink: sink.clone(),
                observer: hooks.observer.clone(),
                failures: hooks.failures.clone(),
                metrics: Arc::new(LaneMetrics::new()),
            };
            let (handle, task) = LaneWriter::spawn(
                *config.lanes.get(lane),
                config.channel_depth(lane),
                ctx,
                shutdown.child_token(),
            );
            handles.push(handle);
            slots.push(LaneSlot { lane, handle: task });
        }

        let lanes: [LaneHandle; 3] = handles
            .try_into()
            .map_err(|_| EngineError::Config("expected exactly three lanes".into()))?;

        tracing::info!(sink = %sink.name(), "engine started");

        Ok(Engine {
            router: Arc::new(Router::new(lanes, config.admission_timeout())),
            sink,
            shutdown,
            teardown: tokio::sync::Mutex::new(Teardown {
                slots,
                released: false,
            }),
            config,
        })
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Metrics of every lane, in priority order.
    pub fn snapshot(&self) -> Vec<LaneSnapshot> {
        self.router
            .lanes()
            .iter()
            .map(|h| h.metrics().snapshot(h.lane()))
            .collect()
    }

    /// Drain every lane and release the sink.
    ///
    /// Lanes stop admitting, commit what they hold and wait for their in-flight
    /// commits. Lanes not `Closed` within `timeout` are reported in
    /// [`ShutdownError::Timeout`]; the sink is left open in that case since
    /// their commits may still be running.
    ///
    /// `Ok` always means every lane is closed and the sink released. After a
    /// timeout the call can be repeated to keep waiting. Concurrent callers
    /// queue behind each other; once released, further calls return `Ok`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        let deadline = Instant::now() + timeout;
        if !self.shutdown.is_cancelled() {
            tracing::info!(timeout_ms = timeout.as_millis() as u64, "engine shutting down");
            self.shutdown.cancel();
        }

        let Ok(mut teardown) = tokio::time::timeout_at(deadline, self.teardown.lock()).await else {
            // Another caller holds the teardown past our deadline.
            return Err(ShutdownError::Timeout { stuck: self.open_lanes() });
        };
        if teardown.released {
            return Ok(());
        }

        let [high, medium, low] = self.router.lanes();
        let (high, medium, low) = tokio::join!(
            wait_closed(high, deadline),
            wait_closed(medium, deadline),
            wait_closed(low, deadline),
        );
        let stuck: Vec<Lane> = [high, medium, low].into_iter().flatten().collect();
        if !stuck.is_empty() {
            for lane in &stuck {
                tracing::error!(lane = %lane, "lane did not drain before shutdown timeout");
            }
            return Err(ShutdownError::Timeout { stuck });
        }

        for slot in teardown.slots.drain(..) {
            if let Err(e) = slot.handle.await {
                tracing::error!(lane = %slot.lane, error = %e, "lane task failed");
            }
        }

        self.sink.close().await.map_err(ShutdownError::Sink)?;
        teardown.released = true;
        tracing::info!("engine shut down");
        Ok(())
    }

    /// Lanes that have not reached [`LaneState::Closed`] yet.
    fn open_lanes(&self) -> Vec<Lane> {
        self.router
            .lanes()
            .iter()
            .filter(|h| h.state() != LaneState::Closed)
            .map(LaneHandle::lane)
            .collect()
    }
}

/// `None` once closed, `Some(lane)` if the deadline passed first.
async fn wait_closed(handle: &LaneHandle, deadline: Instant) -> Option<Lane> {
    tokio::time::timeout_at(deadline, handle.closed())
        .await
        .err()
        .map(|_| handle.lane())
}
