use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::bail;
use crate::error::{BulkError, BulkResult, ErrorKind};
use crate::index::{IndexCycleFinished, IndexCycleObserver};
use crate::orchestrator::BatchListener;
use crate::queue::{AddedItem, QueueListener, RemovalReason, WorkItem};
use crate::scope::BatchScope;
use crate::store::tracker::TrackerStore;
use crate::tracker::CompletionTracker;

/// Connects batches, the work queue and the index observer to the completion tracker.
///
/// Registered as a [`BatchListener`] it locks and unlocks the batch's operation. Registered
/// as a [`QueueListener`] it tags items queued within a batch, counts them, and counts their
/// consumption. Index cycle ends release the operations that completed before the cycle
/// started. Queue events of other pools are ignored.
pub struct ConsistencyBarrierCoordinator<S> {
    pool_name: String,
    tracker: CompletionTracker<S>,
    observer: Arc<IndexCycleObserver>,
}

impl<S> ConsistencyBarrierCoordinator<S>
where
    S: TrackerStore + Send + Sync,
{
    pub fn new(
        pool_name: impl Into<String>,
        tracker: CompletionTracker<S>,
        observer: Arc<IndexCycleObserver>,
    ) -> Self {
        Self {
            pool_name: pool_name.into(),
            tracker,
            observer,
        }
    }

    pub fn tracker(&self) -> &CompletionTracker<S> {
        &self.tracker
    }

    pub fn observer(&self) -> &Arc<IndexCycleObserver> {
        &self.observer
    }

    fn is_tracked_pool(&self, pool_name: &str) -> bool {
        pool_name.eq_ignore_ascii_case(&self.pool_name)
    }

    /// Releases the operations that completed before the finished cycle started.
    pub async fn on_cycle_finished(&self, event: &IndexCycleFinished) -> BulkResult<usize> {
        let Some(started_at) = event.window.started_at else {
            debug!(index = %event.index_name, "finished index cycle has no known start");
            return Ok(0);
        };

        self.release_completed_before(started_at).await
    }

    /// Releases every complete operation whose completion time is strictly before `cutoff`.
    pub async fn release_completed_before(&self, cutoff: DateTime<Utc>) -> BulkResult<usize> {
        let operations = self.tracker.complete_operation_ids().await?;
        if operations.is_empty() {
            return Ok(0);
        }

        let to_release: Vec<_> = operations
            .into_iter()
            .filter(|(_, completed_at)| *completed_at < cutoff)
            .map(|(operation_id, _)| operation_id)
            .collect();
        if to_release.is_empty() {
            return Ok(0);
        }

        self.tracker.release_many(to_release).await
    }

    /// Releases operations that completed before the process started when no index cycle
    /// is going to do it.
    ///
    /// Does nothing if a cycle is queued or running, or if one already finished since the
    /// process started.
    pub async fn startup_cleanup(&self, process_started_at: DateTime<Utc>) -> BulkResult<usize> {
        if self.observer.is_cycle_queued_or_running().await || self.observer.had_update() {
            return Ok(0);
        }

        let released = self.release_completed_before(process_started_at).await?;
        if released > 0 {
            warn!(released, "released operations completed before startup");
        }

        Ok(released)
    }
}

#[async_trait::async_trait]
impl<S> BatchListener for ConsistencyBarrierCoordinator<S>
where
    S: TrackerStore + Send + Sync,
{
    async fn on_batch_starting(&self, scope: &BatchScope) -> BulkResult<()> {
        if !self.tracker.lock(scope.operation_id()).await? {
            bail!(
                ErrorKind::OperationAlreadyRegistered,
                "The operation is already registered",
                scope.operation_id()
            );
        }

        Ok(())
    }

    async fn on_batch_finished(&self, scope: &BatchScope, queued_count: usize) -> BulkResult<()> {
        let complete = self
            .tracker
            .unlock(scope.operation_id(), u64::try_from(queued_count)?)
            .await?;

        info!(
            operation_id = %scope.operation_id(),
            queued_count,
            complete,
            "batch unlocked"
        );

        Ok(())
    }
}

#[async_trait::async_trait]
impl<S> QueueListener for ConsistencyBarrierCoordinator<S>
where
    S: TrackerStore + Send + Sync,
{
    async fn on_adding(
        &self,
        pool_name: &str,
        item: &mut WorkItem,
        scope: Option<&BatchScope>,
    ) -> BulkResult<()> {
        if !self.is_tracked_pool(pool_name) {
            return Ok(());
        }

        if let Some(scope) = scope {
            item.tag_operation(scope.operation_id());
        }

        Ok(())
    }

    async fn on_added(
        &self,
        pool_name: &str,
        added: &AddedItem,
        scope: Option<&BatchScope>,
    ) -> BulkResult<()> {
        if !self.is_tracked_pool(pool_name) {
            return Ok(());
        }

        let Some(scope) = scope else {
            return Ok(());
        };

        if !added.item.is_tagged_with(scope.operation_id()) {
            warn!(
                pool = %pool_name,
                key = %added.item.key,
                operation_id = %scope.operation_id(),
                "queued item is not tagged with the batch operation"
            );
            return Ok(());
        }

        if added.newly_tagged(scope.operation_id()) {
            scope.record_queued();
        }

        Ok(())
    }

    async fn on_removed(
        &self,
        pool_name: &str,
        item: &WorkItem,
        reason: RemovalReason,
    ) -> BulkResult<()> {
        if !self.is_tracked_pool(pool_name) {
            return Ok(());
        }

        if reason == RemovalReason::MaxAttemptsReached && item.operation_ids.is_some() {
            warn!(
                pool = %pool_name,
                key = %item.key,
                attempts = item.attempts,
                "evicted item counts as consumed for its operations"
            );
        }

        // The item is already gone, so a failed increment cannot be retried from the queue.
        let mut errors = Vec::new();
        for operation_id in item.operation_ids() {
            if let Err(err) = self.tracker.inc(operation_id).await {
                error!(
                    pool = %pool_name,
                    key = %item.key,
                    %operation_id,
                    error = %err,
                    "lost the consumption of a removed item, the operation will not complete"
                );
                errors.push(err);
            }
        }

        if !errors.is_empty() {
            return Err(BulkError::from(errors));
        }

        Ok(())
    }

    async fn on_cleared(&self, pool_name: &str) -> BulkResult<()> {
        if !self.is_tracked_pool(pool_name) {
            return Ok(());
        }

        warn!(pool = %pool_name, "queue cleared, dropping all tracked operations");
        self.tracker.clear_all().await?;

        Ok(())
    }
}
