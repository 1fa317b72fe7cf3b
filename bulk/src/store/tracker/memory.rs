use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::BulkResult;
use crate::store::tracker::{OperationState, TrackerStore, VersionedOperation};
use crate::types::OperationId;

#[derive(Debug, Default)]
struct Inner {
    operations: HashMap<OperationId, VersionedOperation>,
}

/// In-memory tracker store. Operations do not survive a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrackerStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackerStore for MemoryTrackerStore {
    async fn get(&self, operation_id: OperationId) -> BulkResult<Option<VersionedOperation>> {
        let inner = self.inner.lock().await;

        Ok(inner.operations.get(&operation_id).copied())
    }

    async fn insert(&self, operation_id: OperationId) -> BulkResult<bool> {
        let mut inner = self.inner.lock().await;

        if inner.operations.contains_key(&operation_id) {
            return Ok(false);
        }

        inner.operations.insert(
            operation_id,
            VersionedOperation {
                state: OperationState::InProgress {
                    counter: 0,
                    fixed: false,
                },
                version: 0,
            },
        );

        Ok(true)
    }

    async fn replace(
        &self,
        operation_id: OperationId,
        expected_version: u64,
        state: OperationState,
    ) -> BulkResult<bool> {
        let mut inner = self.inner.lock().await;

        match inner.operations.get_mut(&operation_id) {
            Some(operation) if operation.version == expected_version => {
                operation.state = state;
                operation.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_complete(&self, operation_id: OperationId) -> BulkResult<bool> {
        let mut inner = self.inner.lock().await;

        let is_complete = inner
            .operations
            .get(&operation_id)
            .is_some_and(|operation| operation.state.is_complete());
        if is_complete {
            inner.operations.remove(&operation_id);
        }

        Ok(is_complete)
    }

    async fn complete_operations(&self) -> BulkResult<BTreeMap<OperationId, DateTime<Utc>>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .operations
            .iter()
            .filter_map(|(operation_id, operation)| match operation.state {
                OperationState::Complete { completed_at } => Some((*operation_id, completed_at)),
                OperationState::InProgress { .. } => None,
            })
            .collect())
    }

    async fn clear(&self) -> BulkResult<u64> {
        let mut inner = self.inner.lock().await;
        let removed = inner.operations.len() as u64;
        inner.operations.clear();

        Ok(removed)
    }
}
