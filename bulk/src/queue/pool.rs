use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bulk_config::shared::{DuplicateKeyPolicy, QueueConfig};
use chrono::{TimeDelta, Utc};
use metrics::counter;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::bail;
use crate::error::{BulkResult, ErrorKind};
use crate::metrics::{
    BULK_QUEUE_CHECKOUT_CALLS_TOTAL, BULK_QUEUE_CHECKOUTS_TOTAL, BULK_QUEUE_CLEARS_TOTAL,
    BULK_QUEUE_ITEMS_ADDED_TOTAL, BULK_QUEUE_ITEMS_MERGED_TOTAL, BULK_QUEUE_ITEMS_REJECTED_TOTAL,
    BULK_QUEUE_ITEMS_REMOVED_TOTAL, POOL_NAME_LABEL, REMOVAL_REASON_LABEL,
};
use crate::queue::{AddKind, AddedItem, QueueListener, RemovalReason, SchedulingOptions, WorkItem};
use crate::scope::BatchScope;
use crate::store::queue::{InsertOutcome, QueueStore};
use crate::types::ItemKey;

/// A named, persistent, time-scheduled work queue with at-least-once delivery.
///
/// Producers [`add`](WorkQueue::add) items; consumers [`try_checkout`](WorkQueue::try_checkout)
/// a due item, process it and [`check_in`](WorkQueue::check_in) to delete it. An item that is
/// not checked in becomes due again after the retry delay and is evicted once it has been
/// checked out more than `retry_attempts` times.
///
/// Lifecycle events are delivered to the registered [`QueueListener`]s.
pub struct WorkQueue<S> {
    config: QueueConfig,
    store: S,
    enabled: AtomicBool,
    listeners: Vec<Arc<dyn QueueListener>>,
}

impl<S> WorkQueue<S>
where
    S: QueueStore + Send + Sync,
{
    pub fn new(config: QueueConfig, store: S) -> Self {
        let enabled = AtomicBool::new(config.enabled);

        Self {
            config,
            store,
            enabled,
            listeners: Vec::new(),
        }
    }

    /// Registers a listener for the lifecycle events of this queue.
    pub fn with_listener(mut self, listener: Arc<dyn QueueListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn pool_name(&self) -> &str {
        &self.config.pool_name
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Adds an item scheduled `options.delay` from now.
    ///
    /// Returns `false` when the queue is disabled or when the key already exists and the
    /// duplicate key policy is [`DuplicateKeyPolicy::Reject`].
    pub async fn add(&self, item: WorkItem, options: SchedulingOptions) -> BulkResult<bool> {
        Ok(self.add_in_scope(item, options, None).await?.is_some())
    }

    /// Adds an item on behalf of a running batch.
    ///
    /// Listeners see the scope, which is how the item gets associated with the batch's
    /// operation and counted. Returns the item as stored, or `None` when nothing was added.
    pub async fn add_in_scope(
        &self,
        mut item: WorkItem,
        options: SchedulingOptions,
        scope: Option<&BatchScope>,
    ) -> BulkResult<Option<WorkItem>> {
        if !self.is_enabled() {
            debug!(pool = %self.pool_name(), key = %item.key, "queue is disabled, item not added");
            return Ok(None);
        }

        self.store.wait_ready().await?;

        item.scheduled = Utc::now() + to_time_delta(options.delay)?;

        for listener in &self.listeners {
            listener.on_adding(self.pool_name(), &mut item, scope).await?;
        }

        let Some(added) = self.store_item(item).await? else {
            return Ok(None);
        };

        for listener in &self.listeners {
            listener.on_added(self.pool_name(), &added, scope).await?;
        }

        Ok(Some(added.item))
    }

    /// Creates an item for `key` and adds it with the given delay.
    pub async fn add_key(
        &self,
        key: impl Into<ItemKey>,
        delay: Duration,
    ) -> BulkResult<Option<WorkItem>> {
        self.add_in_scope(WorkItem::new(key), SchedulingOptions::delayed(delay), None)
            .await
    }

    async fn store_item(&self, mut item: WorkItem) -> BulkResult<Option<AddedItem>> {
        let pool_name = self.pool_name().to_string();

        if self.config.duplicate_key_policy == DuplicateKeyPolicy::MergeAndUpdate {
            if let Some(merged) = self.store.merge(&item).await? {
                counter!(BULK_QUEUE_ITEMS_MERGED_TOTAL, POOL_NAME_LABEL => pool_name.clone())
                    .increment(1);
                debug!(pool = %pool_name, key = %merged.item.key, "item merged into the queue");

                return Ok(Some(AddedItem {
                    item: merged.item,
                    kind: AddKind::Merged {
                        previous_operation_ids: merged.previous_operation_ids,
                    },
                }));
            }
        }

        item.attempts = 0;
        match self.store.insert(&item).await? {
            InsertOutcome::Inserted => {
                counter!(BULK_QUEUE_ITEMS_ADDED_TOTAL, POOL_NAME_LABEL => pool_name.clone())
                    .increment(1);
                debug!(pool = %pool_name, key = %item.key, "item added to the queue");

                Ok(Some(AddedItem {
                    item,
                    kind: AddKind::Inserted,
                }))
            }
            InsertOutcome::DuplicateKey => {
                counter!(BULK_QUEUE_ITEMS_REJECTED_TOTAL, POOL_NAME_LABEL => pool_name.clone())
                    .increment(1);
                debug!(pool = %pool_name, key = %item.key, "item with the same key is already queued");

                Ok(None)
            }
        }
    }

    /// Checks out a random item among the earliest due ones.
    ///
    /// The returned item is rescheduled `retry_delay` into the future with its attempts
    /// incremented, so it is handed out again if it is not checked in in time. Items over
    /// the retry limit are evicted on the way. Returns `None` when nothing is due.
    pub async fn try_checkout(&self) -> BulkResult<Option<WorkItem>> {
        self.store.wait_ready().await?;

        counter!(BULK_QUEUE_CHECKOUT_CALLS_TOTAL, POOL_NAME_LABEL => self.pool_name().to_string())
            .increment(1);

        let retry_delay = to_time_delta(Duration::from_millis(self.config.retry_delay_ms))?;

        loop {
            let now = Utc::now();
            let candidates = self
                .store
                .due_candidates(now, self.config.candidate_limit)
                .await?;

            if candidates.is_empty() {
                return Ok(None);
            }

            let index = rand::rng().random_range(0..candidates.len());
            let candidate = &candidates[index];

            let Some(item) = self
                .store
                .claim(&candidate.key, candidate.scheduled, now + retry_delay)
                .await?
            else {
                debug!(pool = %self.pool_name(), key = %candidate.key, "lost checkout race, retrying");
                continue;
            };

            if item.attempts > self.config.retry_attempts {
                self.evict(item).await?;
                continue;
            }

            counter!(BULK_QUEUE_CHECKOUTS_TOTAL, POOL_NAME_LABEL => self.pool_name().to_string())
                .increment(1);

            return Ok(Some(item));
        }
    }

    async fn evict(&self, item: WorkItem) -> BulkResult<()> {
        let Some(evicted) = self.store.remove_claimed(&item.key, item.scheduled).await? else {
            return Ok(());
        };

        warn!(
            pool = %self.pool_name(),
            key = %evicted.key,
            attempts = evicted.attempts,
            "item exceeded the maximum number of attempts and was evicted"
        );

        self.notify_removed(&evicted, RemovalReason::MaxAttemptsReached)
            .await
    }

    /// Deletes a processed item.
    ///
    /// Listeners receive the item as it was stored, which includes operation ids merged in
    /// after the checkout. Returns `false` if the item was no longer queued.
    pub async fn check_in(&self, item: &WorkItem) -> BulkResult<bool> {
        self.store.wait_ready().await?;

        let Some(removed) = self.store.remove(&item.key).await? else {
            debug!(pool = %self.pool_name(), key = %item.key, "checked in item was already removed");
            return Ok(false);
        };

        self.notify_removed(&removed, RemovalReason::CheckedIn)
            .await?;

        Ok(true)
    }

    async fn notify_removed(&self, item: &WorkItem, reason: RemovalReason) -> BulkResult<()> {
        counter!(
            BULK_QUEUE_ITEMS_REMOVED_TOTAL,
            POOL_NAME_LABEL => self.pool_name().to_string(),
            REMOVAL_REASON_LABEL => reason.as_str()
        )
        .increment(1);

        for listener in &self.listeners {
            listener.on_removed(self.pool_name(), item, reason).await?;
        }

        Ok(())
    }

    /// Deletes every item of the queue.
    pub async fn cancel_all(&self) -> BulkResult<u64> {
        self.store.wait_ready().await?;

        let removed = self.store.clear().await?;

        counter!(BULK_QUEUE_CLEARS_TOTAL, POOL_NAME_LABEL => self.pool_name().to_string())
            .increment(1);
        info!(pool = %self.pool_name(), removed, "queue cleared");

        for listener in &self.listeners {
            listener.on_cleared(self.pool_name()).await?;
        }

        Ok(removed)
    }

    pub async fn get(&self, key: &ItemKey) -> BulkResult<Option<WorkItem>> {
        self.store.wait_ready().await?;
        self.store.get(key).await
    }
}

fn to_time_delta(duration: Duration) -> BulkResult<TimeDelta> {
    match TimeDelta::from_std(duration) {
        Ok(delta) => Ok(delta),
        Err(err) => bail!(
            ErrorKind::ConfigError,
            "Queue delay is out of range",
            format!("{duration:?}: {err}")
        ),
    }
}
