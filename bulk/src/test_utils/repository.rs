use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::BulkResult;
use crate::orchestrator::{LeaseOwner, LoadOutcome, Record, RecordRepository};
use crate::queue::{SchedulingOptions, WorkItem, WorkQueue};
use crate::scope::BatchScope;
use crate::store::queue::{MemoryQueueStore, QueueStore};
use crate::types::{ItemKey, RecordId};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, Record>,
    leases: HashMap<String, LeaseOwner>,
    failing_saves: HashSet<String>,
    saves: usize,
}

/// An in-memory record repository.
///
/// Leases are granted immediately or refused immediately; the load timeout is not waited
/// for. When a queue is attached, every save queues one work item keyed by the record id
/// within the batch scope.
pub struct MemoryRecordRepository<Q = MemoryQueueStore> {
    inner: Arc<Mutex<Inner>>,
    queue: OnceLock<Arc<WorkQueue<Q>>>,
}

impl<Q> MemoryRecordRepository<Q>
where
    Q: QueueStore + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            queue: OnceLock::new(),
        }
    }

    /// Queues one item per saved record into `queue`. Only the first attached queue is used.
    pub fn attach_queue(&self, queue: Arc<WorkQueue<Q>>) {
        let _ = self.queue.set(queue);
    }

    pub async fn insert_record(&self, record: Record) {
        let mut inner = self.inner.lock().await;
        inner.records.insert(record.identifier.clone(), record);
    }

    pub async fn record(&self, identifier: &str) -> Option<Record> {
        let inner = self.inner.lock().await;
        inner.records.get(identifier).cloned()
    }

    /// Holds the lease of `identifier` on behalf of `owner`.
    pub async fn hold_lease(&self, identifier: &str, owner: LeaseOwner) {
        let mut inner = self.inner.lock().await;
        inner.leases.insert(identifier.to_string(), owner);
    }

    pub async fn lease_owner(&self, identifier: &str) -> Option<LeaseOwner> {
        let inner = self.inner.lock().await;
        inner.leases.get(identifier).cloned()
    }

    /// Makes every save of `identifier` report failure.
    pub async fn fail_saves_for(&self, identifier: &str) {
        let mut inner = self.inner.lock().await;
        inner.failing_saves.insert(identifier.to_string());
    }

    pub async fn save_count(&self) -> usize {
        self.inner.lock().await.saves
    }
}

impl<Q> Default for MemoryRecordRepository<Q>
where
    Q: QueueStore + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<Q> RecordRepository for MemoryRecordRepository<Q>
where
    Q: QueueStore + Send + Sync,
{
    async fn try_load_with_lease(
        &self,
        identifier: &str,
        owner: &LeaseOwner,
        _timeout: Duration,
    ) -> BulkResult<LoadOutcome> {
        let mut inner = self.inner.lock().await;

        if let Some(holder) = inner.leases.get(identifier) {
            if holder != owner {
                return Ok(LoadOutcome::LockFailure);
            }
        }

        let Some(record) = inner.records.get(identifier).cloned() else {
            return Ok(LoadOutcome::NotFound);
        };

        inner.leases.insert(identifier.to_string(), owner.clone());

        Ok(LoadOutcome::Loaded(record))
    }

    async fn create_record(&self, id: RecordId, identifier: &str) -> BulkResult<Record> {
        Ok(Record::new(id, identifier))
    }

    async fn save_record(
        &self,
        record: &Record,
        owner: &LeaseOwner,
        release_lease: bool,
        scope: &BatchScope,
    ) -> BulkResult<bool> {
        {
            let mut inner = self.inner.lock().await;

            if inner.failing_saves.contains(&record.identifier) {
                return Ok(false);
            }

            inner.saves += 1;
            inner
                .records
                .insert(record.identifier.clone(), record.clone());

            if release_lease && inner.leases.get(&record.identifier) == Some(owner) {
                inner.leases.remove(&record.identifier);
            }
        }

        if let Some(queue) = self.queue.get() {
            let item = WorkItem::new(ItemKey::from(record.id.as_uuid()))
                .with_property("identifier", record.identifier.clone());
            queue
                .add_in_scope(item, SchedulingOptions::default(), Some(scope))
                .await?;
        }

        Ok(true)
    }

    async fn release_lease(&self, record_id: RecordId, owner: &LeaseOwner) -> BulkResult<()> {
        let mut inner = self.inner.lock().await;

        let identifier = inner
            .records
            .values()
            .find(|record| record.id == record_id)
            .map(|record| record.identifier.clone());

        if let Some(identifier) = identifier {
            if inner.leases.get(&identifier) == Some(owner) {
                inner.leases.remove(&identifier);
            }
        }

        Ok(())
    }
}
