use std::collections::BTreeSet;
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::BulkResult;
use crate::queue::{Candidate, WorkItem};
use crate::types::{ItemKey, OperationId};

/// Result of inserting a new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An item with the same key already exists; nothing was written.
    DuplicateKey,
}

/// An item after a merge, with the operation ids it carried before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedItem {
    pub item: WorkItem,
    pub previous_operation_ids: BTreeSet<OperationId>,
}

/// Storage of the items of one queue.
///
/// Every mutating method is a single atomic step against the backing store. Checkout
/// safety relies on [`QueueStore::claim`] being a conditional update: two consumers that
/// read the same candidate must not both succeed.
pub trait QueueStore {
    /// Completes once the store can serve requests.
    fn wait_ready(&self) -> impl Future<Output = BulkResult<()>> + Send;

    /// Inserts `item` unless its key is already present.
    fn insert(&self, item: &WorkItem) -> impl Future<Output = BulkResult<InsertOutcome>> + Send;

    /// Overwrites schedule, attempts and properties of the stored item with the same key
    /// and unions the operation ids. Returns `None` when no such item exists.
    fn merge(
        &self,
        item: &WorkItem,
    ) -> impl Future<Output = BulkResult<Option<MergedItem>>> + Send;

    /// Returns up to `limit` items due at `now`, earliest first.
    fn due_candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = BulkResult<Vec<Candidate>>> + Send;

    /// Sets `scheduled` to `next_scheduled` and increments `attempts`, provided the item
    /// still carries `expected_scheduled`. Returns the updated item if the claim won.
    fn claim(
        &self,
        key: &ItemKey,
        expected_scheduled: DateTime<Utc>,
        next_scheduled: DateTime<Utc>,
    ) -> impl Future<Output = BulkResult<Option<WorkItem>>> + Send;

    fn get(&self, key: &ItemKey) -> impl Future<Output = BulkResult<Option<WorkItem>>> + Send;

    /// Deletes the item and returns it as it was stored.
    fn remove(&self, key: &ItemKey) -> impl Future<Output = BulkResult<Option<WorkItem>>> + Send;

    /// Deletes the item only if it still carries `scheduled`.
    fn remove_claimed(
        &self,
        key: &ItemKey,
        scheduled: DateTime<Utc>,
    ) -> impl Future<Output = BulkResult<Option<WorkItem>>> + Send;

    /// Deletes every item and returns how many were removed.
    fn clear(&self) -> impl Future<Output = BulkResult<u64>> + Send;
}
