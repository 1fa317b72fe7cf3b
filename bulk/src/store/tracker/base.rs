use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::BulkResult;
use crate::types::OperationId;

/// Persisted state of one tracked operation.
///
/// An operation is either in the in-progress partition, holding its countdown, or in the
/// complete partition, holding its completion time. Released operations have no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    InProgress {
        /// Negative while queued items are still outstanding.
        counter: i64,
        /// Whether the total number of queued items is known.
        fixed: bool,
    },
    Complete {
        completed_at: DateTime<Utc>,
    },
}

impl OperationState {
    pub fn is_complete(&self) -> bool {
        matches!(self, OperationState::Complete { .. })
    }
}

/// An operation state together with the version used for compare-and-swap updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedOperation {
    pub state: OperationState,
    pub version: u64,
}

/// Storage of the completion tracker.
///
/// Mutations of an existing operation go through [`TrackerStore::replace`], which only
/// succeeds against the version that was read. Callers retry on conflict, so concurrent
/// increments are never lost.
pub trait TrackerStore {
    fn get(
        &self,
        operation_id: OperationId,
    ) -> impl Future<Output = BulkResult<Option<VersionedOperation>>> + Send;

    /// Inserts an in-progress operation with a zero counter. Returns `false` if an operation
    /// with this id exists in either partition.
    fn insert(&self, operation_id: OperationId) -> impl Future<Output = BulkResult<bool>> + Send;

    /// Stores `state` if the operation is still at `expected_version`.
    fn replace(
        &self,
        operation_id: OperationId,
        expected_version: u64,
        state: OperationState,
    ) -> impl Future<Output = BulkResult<bool>> + Send;

    /// Deletes the operation if it is complete. Returns `false` otherwise.
    fn remove_complete(
        &self,
        operation_id: OperationId,
    ) -> impl Future<Output = BulkResult<bool>> + Send;

    /// Snapshot of the complete partition.
    fn complete_operations(
        &self,
    ) -> impl Future<Output = BulkResult<BTreeMap<OperationId, DateTime<Utc>>>> + Send;

    /// Deletes every operation in both partitions.
    fn clear(&self) -> impl Future<Output = BulkResult<u64>> + Send;
}
