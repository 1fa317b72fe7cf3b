use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};

use crate::error::BulkResult;
use crate::store::tracker::{MemoryTrackerStore, OperationState, TrackerStore, VersionedOperation};
use crate::test_utils::notify::TimedNotify;
use crate::types::OperationId;

type OperationCondition = (
    OperationId,
    Arc<Notify>,
    Box<dyn Fn(Option<&OperationState>) -> bool + Send + Sync>,
);

struct Inner {
    states: HashMap<OperationId, Option<OperationState>>,
    conditions: Vec<OperationCondition>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let states = &self.states;
        self.conditions.retain(|(operation_id, notify, condition)| {
            let Some(state) = states.get(operation_id) else {
                return true;
            };

            let should_retain = !condition(state.as_ref());
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// A tracker store that wakes tests when an operation reaches a state.
///
/// Delegates storage to a [`MemoryTrackerStore`] and mirrors the last known state of every
/// operation it has seen; a released operation is mirrored as `None`.
#[derive(Clone)]
pub struct NotifyingTrackerStore {
    store: MemoryTrackerStore,
    inner: Arc<RwLock<Inner>>,
}

impl NotifyingTrackerStore {
    pub fn new() -> Self {
        Self {
            store: MemoryTrackerStore::new(),
            inner: Arc::new(RwLock::new(Inner {
                states: HashMap::new(),
                conditions: Vec::new(),
            })),
        }
    }

    /// Registers a notification that fires when the operation's state satisfies `condition`,
    /// including when it already does.
    pub async fn notify_on_operation_state<F>(
        &self,
        operation_id: OperationId,
        condition: F,
    ) -> TimedNotify
    where
        F: Fn(Option<&OperationState>) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        inner
            .conditions
            .push((operation_id, notify.clone(), Box::new(condition)));

        inner.check_conditions();

        TimedNotify::new(notify)
    }

    pub async fn notify_on_complete(&self, operation_id: OperationId) -> TimedNotify {
        self.notify_on_operation_state(operation_id, |state| {
            state.is_some_and(OperationState::is_complete)
        })
        .await
    }

    pub async fn notify_on_released(&self, operation_id: OperationId) -> TimedNotify {
        self.notify_on_operation_state(operation_id, |state| state.is_none())
            .await
    }

    async fn mirror(&self, operation_id: OperationId) -> BulkResult<()> {
        let state = self
            .store
            .get(operation_id)
            .await?
            .map(|operation| operation.state);

        let mut inner = self.inner.write().await;
        inner.states.insert(operation_id, state);
        inner.check_conditions();

        Ok(())
    }
}

impl Default for NotifyingTrackerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerStore for NotifyingTrackerStore {
    async fn get(&self, operation_id: OperationId) -> BulkResult<Option<VersionedOperation>> {
        self.store.get(operation_id).await
    }

    async fn insert(&self, operation_id: OperationId) -> BulkResult<bool> {
        let inserted = self.store.insert(operation_id).await?;
        self.mirror(operation_id).await?;

        Ok(inserted)
    }

    async fn replace(
        &self,
        operation_id: OperationId,
        expected_version: u64,
        state: OperationState,
    ) -> BulkResult<bool> {
        let replaced = self
            .store
            .replace(operation_id, expected_version, state)
            .await?;
        self.mirror(operation_id).await?;

        Ok(replaced)
    }

    async fn remove_complete(&self, operation_id: OperationId) -> BulkResult<bool> {
        let removed = self.store.remove_complete(operation_id).await?;
        self.mirror(operation_id).await?;

        Ok(removed)
    }

    async fn complete_operations(&self) -> BulkResult<BTreeMap<OperationId, DateTime<Utc>>> {
        self.store.complete_operations().await
    }

    async fn clear(&self) -> BulkResult<u64> {
        let removed = self.store.clear().await?;

        let mut inner = self.inner.write().await;
        for state in inner.states.values_mut() {
            *state = None;
        }
        inner.check_conditions();

        Ok(removed)
    }
}
