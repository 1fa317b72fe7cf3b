use crate::error::BulkResult;
use crate::scope::BatchScope;

/// Receives the start and end of every batch run by the orchestrator.
#[async_trait::async_trait]
pub trait BatchListener: Send + Sync {
    /// Called before the first record of the batch is processed.
    ///
    /// An error fails the job before any record is touched.
    async fn on_batch_starting(&self, scope: &BatchScope) -> BulkResult<()>;

    /// Called once after the last record, whether the batch succeeded or not.
    async fn on_batch_finished(&self, scope: &BatchScope, queued_count: usize) -> BulkResult<()>;
}
