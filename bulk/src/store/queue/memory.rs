use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::BulkResult;
use crate::queue::{Candidate, WorkItem};
use crate::store::queue::{InsertOutcome, MergedItem, QueueStore};
use crate::types::ItemKey;

#[derive(Debug, Default)]
struct Inner {
    items: HashMap<ItemKey, WorkItem>,
}

/// In-memory queue store.
///
/// The mutex makes every method atomic, which gives the same claim semantics as the
/// Postgres store. Items are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored item, ordered by schedule.
    pub async fn items(&self) -> Vec<WorkItem> {
        let inner = self.inner.lock().await;
        let mut items: Vec<_> = inner.items.values().cloned().collect();
        items.sort_by(|a, b| a.scheduled.cmp(&b.scheduled).then(a.key.cmp(&b.key)));
        items
    }
}

impl QueueStore for MemoryQueueStore {
    async fn wait_ready(&self) -> BulkResult<()> {
        Ok(())
    }

    async fn insert(&self, item: &WorkItem) -> BulkResult<InsertOutcome> {
        let mut inner = self.inner.lock().await;

        if inner.items.contains_key(&item.key) {
            return Ok(InsertOutcome::DuplicateKey);
        }

        inner.items.insert(item.key.clone(), item.clone());

        Ok(InsertOutcome::Inserted)
    }

    async fn merge(&self, item: &WorkItem) -> BulkResult<Option<MergedItem>> {
        let mut inner = self.inner.lock().await;

        let Some(stored) = inner.items.get_mut(&item.key) else {
            return Ok(None);
        };

        let previous_operation_ids: BTreeSet<_> = stored.operation_ids().collect();

        stored.scheduled = item.scheduled;
        stored.attempts = item.attempts;
        stored.properties = item.properties.clone();
        for operation_id in item.operation_ids() {
            stored.tag_operation(operation_id);
        }

        Ok(Some(MergedItem {
            item: stored.clone(),
            previous_operation_ids,
        }))
    }

    async fn due_candidates(&self, now: DateTime<Utc>, limit: usize) -> BulkResult<Vec<Candidate>> {
        let inner = self.inner.lock().await;

        let mut candidates: Vec<_> = inner
            .items
            .values()
            .filter(|item| item.scheduled <= now)
            .map(|item| Candidate {
                key: item.key.clone(),
                scheduled: item.scheduled,
            })
            .collect();
        candidates.sort_by(|a, b| a.scheduled.cmp(&b.scheduled));
        candidates.truncate(limit);

        Ok(candidates)
    }

    async fn claim(
        &self,
        key: &ItemKey,
        expected_scheduled: DateTime<Utc>,
        next_scheduled: DateTime<Utc>,
    ) -> BulkResult<Option<WorkItem>> {
        let mut inner = self.inner.lock().await;

        match inner.items.get_mut(key) {
            Some(item) if item.scheduled == expected_scheduled => {
                item.scheduled = next_scheduled;
                item.attempts = item.attempts.saturating_add(1);
                Ok(Some(item.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn get(&self, key: &ItemKey) -> BulkResult<Option<WorkItem>> {
        let inner = self.inner.lock().await;

        Ok(inner.items.get(key).cloned())
    }

    async fn remove(&self, key: &ItemKey) -> BulkResult<Option<WorkItem>> {
        let mut inner = self.inner.lock().await;

        Ok(inner.items.remove(key))
    }

    async fn remove_claimed(
        &self,
        key: &ItemKey,
        scheduled: DateTime<Utc>,
    ) -> BulkResult<Option<WorkItem>> {
        let mut inner = self.inner.lock().await;

        if inner
            .items
            .get(key)
            .is_some_and(|item| item.scheduled == scheduled)
        {
            return Ok(inner.items.remove(key));
        }

        Ok(None)
    }

    async fn clear(&self) -> BulkResult<u64> {
        let mut inner = self.inner.lock().await;

        let removed = inner.items.len() as u64;
        inner.items.clear();

        Ok(removed)
    }
}
