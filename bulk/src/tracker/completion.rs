use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::{BulkError, BulkResult};
use crate::metrics::{
    BULK_OPERATION_ANOMALIES_TOTAL, BULK_OPERATIONS_COMPLETED_TOTAL, BULK_OPERATIONS_RELEASED_TOTAL,
};
use crate::store::tracker::{OperationState, TrackerStore};
use crate::types::OperationId;

/// Persistent countdown latch keyed by operation id.
///
/// A batch [`lock`](CompletionTracker::lock)s its operation before queuing anything, every
/// consumed item [`inc`](CompletionTracker::inc)rements the counter and the batch
/// [`unlock`](CompletionTracker::unlock)s with the number of items it queued. The operation
/// becomes complete when the count is known and the counter is back at zero, regardless of
/// the order in which increments and the unlock arrive.
#[derive(Debug, Clone)]
pub struct CompletionTracker<S> {
    store: S,
}

impl<S> CompletionTracker<S>
where
    S: TrackerStore + Send + Sync,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers a new operation. Returns `false` if the id is already registered.
    pub async fn lock(&self, operation_id: OperationId) -> BulkResult<bool> {
        let inserted = self.store.insert(operation_id).await?;

        if inserted {
            debug!(%operation_id, "operation registered");
        } else {
            warn!(%operation_id, "operation is already registered");
        }

        Ok(inserted)
    }

    /// Records one consumed item and returns the new counter.
    ///
    /// Completes the operation only when the count is known and the counter reaches exactly
    /// 0. Does nothing and returns 0 when the operation is not in progress.
    pub async fn inc(&self, operation_id: OperationId) -> BulkResult<i64> {
        loop {
            let Some(operation) = self.store.get(operation_id).await? else {
                return Ok(0);
            };
            let OperationState::InProgress { counter, fixed } = operation.state else {
                return Ok(0);
            };

            let counter = counter.saturating_add(1);
            let state = if fixed && counter == 0 {
                OperationState::Complete {
                    completed_at: Utc::now(),
                }
            } else {
                OperationState::InProgress { counter, fixed }
            };

            if self
                .store
                .replace(operation_id, operation.version, state)
                .await?
            {
                self.on_transition(operation_id, &state);
                return Ok(counter);
            }
        }
    }

    /// Marks the number of queued items as known and subtracts it from the counter.
    ///
    /// Returns `true` when the operation is complete afterwards, including when it was not
    /// in progress to begin with, and `false` while queued items are outstanding.
    pub async fn unlock(&self, operation_id: OperationId, queued_count: u64) -> BulkResult<bool> {
        let queued_count = i64::try_from(queued_count)?;

        loop {
            let Some(operation) = self.store.get(operation_id).await? else {
                return Ok(true);
            };
            let OperationState::InProgress { counter, .. } = operation.state else {
                return Ok(true);
            };

            let counter = counter.saturating_sub(queued_count);
            let state = if counter >= 0 {
                if counter > 0 {
                    warn!(%operation_id, counter, "more items consumed than queued, completing operation");
                    counter!(BULK_OPERATION_ANOMALIES_TOTAL).increment(1);
                }

                OperationState::Complete {
                    completed_at: Utc::now(),
                }
            } else {
                OperationState::InProgress {
                    counter,
                    fixed: true,
                }
            };

            if self
                .store
                .replace(operation_id, operation.version, state)
                .await?
            {
                self.on_transition(operation_id, &state);
                return Ok(state.is_complete());
            }
        }
    }

    /// Subtracts `processed_items` from the counter and marks the count as known without
    /// completing the operation. Returns the new counter, or 0 if the operation is not in
    /// progress.
    pub async fn update(&self, operation_id: OperationId, processed_items: u64) -> BulkResult<i64> {
        let processed_items = i64::try_from(processed_items)?;

        loop {
            let Some(operation) = self.store.get(operation_id).await? else {
                return Ok(0);
            };
            let OperationState::InProgress { counter, .. } = operation.state else {
                return Ok(0);
            };

            let counter = counter.saturating_sub(processed_items);
            let state = OperationState::InProgress {
                counter,
                fixed: true,
            };

            if self
                .store
                .replace(operation_id, operation.version, state)
                .await?
            {
                return Ok(counter);
            }
        }
    }

    fn on_transition(&self, operation_id: OperationId, state: &OperationState) {
        if let OperationState::Complete { completed_at } = state {
            counter!(BULK_OPERATIONS_COMPLETED_TOTAL).increment(1);
            info!(%operation_id, %completed_at, "operation complete");
        }
    }

    /// Returns whether the operation is in progress or complete.
    pub async fn is_registered(&self, operation_id: OperationId) -> BulkResult<bool> {
        Ok(self.store.get(operation_id).await?.is_some())
    }

    pub async fn state(&self, operation_id: OperationId) -> BulkResult<Option<OperationState>> {
        Ok(self
            .store
            .get(operation_id)
            .await?
            .map(|operation| operation.state))
    }

    /// Deletes a complete operation.
    ///
    /// Returns `false` if the operation is not complete, which includes operations that were
    /// already released.
    pub async fn release(&self, operation_id: OperationId) -> BulkResult<bool> {
        let released = self.store.remove_complete(operation_id).await?;

        if released {
            counter!(BULK_OPERATIONS_RELEASED_TOTAL).increment(1);
            info!(%operation_id, "operation released");
        } else {
            warn!(%operation_id, "cannot release an operation that is not complete");
        }

        Ok(released)
    }

    /// Releases each operation independently and returns how many were released.
    ///
    /// A failing id does not stop the others; the failures are returned together once
    /// every id has been tried.
    pub async fn release_many(
        &self,
        operation_ids: impl IntoIterator<Item = OperationId>,
    ) -> BulkResult<usize> {
        let mut released = 0;
        let mut errors = Vec::new();

        for operation_id in operation_ids {
            match self.release(operation_id).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(err) => errors.push(err),
            }
        }

        if !errors.is_empty() {
            return Err(BulkError::from(errors));
        }

        Ok(released)
    }

    /// Snapshot of complete operations that have not been released yet.
    pub async fn complete_operation_ids(&self) -> BulkResult<BTreeMap<OperationId, DateTime<Utc>>> {
        self.store.complete_operations().await
    }

    /// Deletes every tracked operation, in progress or complete.
    pub async fn clear_all(&self) -> BulkResult<u64> {
        let removed = self.store.clear().await?;
        warn!(removed, "all tracked operations cleared");

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::tracker::MemoryTrackerStore;

    fn tracker() -> CompletionTracker<MemoryTrackerStore> {
        CompletionTracker::new(MemoryTrackerStore::new())
    }

    #[tokio::test]
    async fn lock_rejects_registered_ids() {
        let tracker = tracker();
        let operation_id = OperationId::new();

        assert!(tracker.lock(operation_id).await.unwrap());
        assert!(!tracker.lock(operation_id).await.unwrap());

        tracker.unlock(operation_id, 0).await.unwrap();
        assert!(!tracker.lock(operation_id).await.unwrap());
    }

    #[tokio::test]
    async fn unlock_with_nothing_queued_completes() {
        let tracker = tracker();
        let operation_id = OperationId::new();
        tracker.lock(operation_id).await.unwrap();

        assert!(tracker.unlock(operation_id, 0).await.unwrap());
        assert!(tracker.state(operation_id).await.unwrap().unwrap().is_complete());
    }

    #[tokio::test]
    async fn inc_on_unregistered_operation_is_a_noop() {
        let tracker = tracker();
        let operation_id = OperationId::new();

        assert_eq!(tracker.inc(operation_id).await.unwrap(), 0);
        assert!(!tracker.is_registered(operation_id).await.unwrap());
    }

    #[tokio::test]
    async fn unlock_then_increments_complete_the_operation() {
        let tracker = tracker();
        let operation_id = OperationId::new();
        tracker.lock(operation_id).await.unwrap();

        assert!(!tracker.unlock(operation_id, 3).await.unwrap());
        assert_eq!(
            tracker.state(operation_id).await.unwrap(),
            Some(OperationState::InProgress {
                counter: -3,
                fixed: true
            })
        );

        assert_eq!(tracker.inc(operation_id).await.unwrap(), -2);
        assert_eq!(tracker.inc(operation_id).await.unwrap(), -1);
        assert_eq!(tracker.inc(operation_id).await.unwrap(), 0);

        assert!(tracker.state(operation_id).await.unwrap().unwrap().is_complete());
    }

    #[tokio::test]
    async fn increments_before_unlock_are_counted() {
        let tracker = tracker();
        let operation_id = OperationId::new();
        tracker.lock(operation_id).await.unwrap();

        tracker.inc(operation_id).await.unwrap();
        tracker.inc(operation_id).await.unwrap();
        assert!(!tracker.unlock(operation_id, 3).await.unwrap());
        tracker.inc(operation_id).await.unwrap();

        assert!(tracker.state(operation_id).await.unwrap().unwrap().is_complete());
    }

    #[tokio::test]
    async fn overshoot_on_unlock_forces_completion() {
        let tracker = tracker();
        let operation_id = OperationId::new();
        tracker.lock(operation_id).await.unwrap();

        tracker.inc(operation_id).await.unwrap();
        tracker.inc(operation_id).await.unwrap();

        assert!(tracker.unlock(operation_id, 1).await.unwrap());
        assert!(tracker.state(operation_id).await.unwrap().unwrap().is_complete());
    }

    #[tokio::test]
    async fn update_fixes_the_count_without_completing() {
        let tracker = tracker();
        let operation_id = OperationId::new();
        tracker.lock(operation_id).await.unwrap();

        assert_eq!(tracker.update(operation_id, 0).await.unwrap(), 0);
        assert_eq!(
            tracker.state(operation_id).await.unwrap(),
            Some(OperationState::InProgress {
                counter: 0,
                fixed: true
            })
        );
        assert_eq!(tracker.update(OperationId::new(), 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_past_zero_keeps_the_operation_in_progress() {
        let tracker = tracker();
        let operation_id = OperationId::new();
        tracker.lock(operation_id).await.unwrap();
        assert_eq!(tracker.update(operation_id, 0).await.unwrap(), 0);

        assert_eq!(tracker.inc(operation_id).await.unwrap(), 1);
        assert_eq!(
            tracker.state(operation_id).await.unwrap(),
            Some(OperationState::InProgress {
                counter: 1,
                fixed: true
            })
        );
    }

    #[tokio::test]
    async fn release_is_safe_to_repeat() {
        let tracker = tracker();
        let operation_id = OperationId::new();
        tracker.lock(operation_id).await.unwrap();

        assert!(!tracker.release(operation_id).await.unwrap());

        tracker.unlock(operation_id, 0).await.unwrap();
        assert!(tracker.release(operation_id).await.unwrap());
        assert!(!tracker.release(operation_id).await.unwrap());
        assert!(!tracker.is_registered(operation_id).await.unwrap());
    }

    #[tokio::test]
    async fn release_many_skips_incomplete_operations() {
        let tracker = tracker();
        let complete = OperationId::new();
        let in_progress = OperationId::new();
        tracker.lock(complete).await.unwrap();
        tracker.lock(in_progress).await.unwrap();
        tracker.unlock(complete, 0).await.unwrap();

        let released = tracker
            .release_many([complete, in_progress, OperationId::new()])
            .await
            .unwrap();

        assert_eq!(released, 1);
        assert!(tracker.is_registered(in_progress).await.unwrap());
        assert!(tracker.complete_operation_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_all_drops_both_partitions() {
        let tracker = tracker();
        let complete = OperationId::new();
        let in_progress = OperationId::new();
        tracker.lock(complete).await.unwrap();
        tracker.lock(in_progress).await.unwrap();
        tracker.unlock(complete, 0).await.unwrap();

        assert_eq!(tracker.clear_all().await.unwrap(), 2);
        assert!(!tracker.is_registered(complete).await.unwrap());
        assert!(!tracker.is_registered(in_progress).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_never_lost() {
        let tracker = Arc::new(tracker());
        let operation_id = OperationId::new();
        tracker.lock(operation_id).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move { tracker.inc(operation_id).await }));
        }
        let unlock = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.unlock(operation_id, 20).await })
        };

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        unlock.await.unwrap().unwrap();

        assert!(tracker.state(operation_id).await.unwrap().unwrap().is_complete());
    }
}
