use std::future::Future;
use std::pin::Pin;

use crate::error::SinkError;
use crate::record::Record;

/// Boxed future returned by sink and observer methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable backend that accepts committed batches.
///
/// The engine doesn't know concrete implementations: for the engine a sink is
/// just this trait. `commit` is called concurrently from several tasks (one per
/// in-flight flush, across all lanes), so implementations handle their own
/// internal synchronization (connection pool, file lock, ...).
pub trait Sink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Commit an ordered batch atomically: either every record is persisted
    /// or none is and an error is returned. Order within `batch` is the
    /// insertion order of the lane buffer.
    fn commit<'a>(&'a self, batch: &'a [Record]) -> BoxFuture<'a, Result<(), SinkError>>;

    /// Release backend resources. Called once, after every lane is closed.
    fn close(&self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Best-effort side collaborator notified after a batch has been committed.
///
/// Runs outside the commit atomicity contract: an observer failure is logged
/// by the engine and never turns a successful commit into a failed one.
pub trait StatusObserver: Send + Sync {
    fn observe<'a>(&'a self, batch: &'a [Record]) -> BoxFuture<'a, Result<(), SinkError>>;
}
