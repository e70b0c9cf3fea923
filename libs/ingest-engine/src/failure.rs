use tokio::sync::mpsc;

use crate::error::CommitError;

/// Receives every failed commit together with its batch.
///
/// The engine never retries; whatever happens to the batch next (retry,
/// spill to disk, drop) is decided here. Called from the commit task, so it
/// must not block.
pub trait FailureHandler: Send + Sync {
    fn handle(&self, failure: CommitError);
}

/// Default handler: log and drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFailures;

impl FailureHandler for LogFailures {
    fn handle(&self, failure: CommitError) {
        tracing::error!(
            lane = %failure.lane,
            reason = %failure.reason,
            records = failure.batch.len(),
            error = %failure.source,
            "batch dropped after failed commit"
        );
    }
}

/// Forward failures to a channel owned by a higher layer.
impl FailureHandler for mpsc::UnboundedSender<CommitError> {
    fn handle(&self, failure: CommitError) {
        if let Err(e) = self.send(failure) {
            LogFailures.handle(e.0);
        }
    }
}
