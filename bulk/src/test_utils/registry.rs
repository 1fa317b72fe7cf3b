use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agent::{LockedResource, LockedResourceRegistry, ResourceLock};
use crate::error::BulkResult;
use crate::types::OperationId;

#[derive(Debug, Default)]
struct Resource {
    locked: bool,
    lock_available: bool,
    operation_ids: BTreeSet<OperationId>,
    refreshes: usize,
}

/// An in-memory registry of lockable resources.
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceRegistry {
    resources: Arc<Mutex<HashMap<String, Resource>>>,
}

impl MemoryResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a locked resource with `operation_ids` attached.
    pub async fn lock_resource(
        &self,
        resource_id: &str,
        operation_ids: impl IntoIterator<Item = OperationId>,
    ) {
        let mut resources = self.resources.lock().await;
        resources.insert(
            resource_id.to_string(),
            Resource {
                locked: true,
                lock_available: true,
                operation_ids: operation_ids.into_iter().collect(),
                refreshes: 0,
            },
        );
    }

    /// Controls whether the lock of the resource can be acquired.
    pub async fn set_lock_available(&self, resource_id: &str, available: bool) {
        if let Some(resource) = self.resources.lock().await.get_mut(resource_id) {
            resource.lock_available = available;
        }
    }

    pub async fn is_locked(&self, resource_id: &str) -> bool {
        self.resources
            .lock()
            .await
            .get(resource_id)
            .is_some_and(|resource| resource.locked)
    }

    pub async fn attached_operations(&self, resource_id: &str) -> BTreeSet<OperationId> {
        self.resources
            .lock()
            .await
            .get(resource_id)
            .map(|resource| resource.operation_ids.clone())
            .unwrap_or_default()
    }

    pub async fn refresh_count(&self, resource_id: &str) -> usize {
        self.resources
            .lock()
            .await
            .get(resource_id)
            .map_or(0, |resource| resource.refreshes)
    }
}

#[async_trait::async_trait]
impl LockedResourceRegistry for MemoryResourceRegistry {
    async fn locked_resources(&self) -> BulkResult<Vec<LockedResource>> {
        let resources = self.resources.lock().await;

        Ok(resources
            .iter()
            .filter(|(_, resource)| resource.locked)
            .map(|(id, resource)| LockedResource {
                id: id.clone(),
                operation_ids: resource.operation_ids.clone(),
            })
            .collect())
    }

    async fn acquire_lock(&self, resource_id: &str) -> BulkResult<Option<ResourceLock>> {
        let resources = self.resources.lock().await;

        let available = resources
            .get(resource_id)
            .is_some_and(|resource| resource.locked && resource.lock_available);

        Ok(available.then(|| ResourceLock {
            resource_id: resource_id.to_string(),
            token: Uuid::new_v4(),
        }))
    }

    async fn detach_operations(
        &self,
        resource_id: &str,
        operation_ids: &[OperationId],
    ) -> BulkResult<()> {
        if let Some(resource) = self.resources.lock().await.get_mut(resource_id) {
            for operation_id in operation_ids {
                resource.operation_ids.remove(operation_id);
            }
        }

        Ok(())
    }

    async fn refresh(&self, resource_id: &str) -> BulkResult<()> {
        if let Some(resource) = self.resources.lock().await.get_mut(resource_id) {
            resource.refreshes += 1;
        }

        Ok(())
    }

    async fn unlock(&self, lock: ResourceLock) -> BulkResult<()> {
        if let Some(resource) = self.resources.lock().await.get_mut(&lock.resource_id) {
            resource.locked = false;
        }

        Ok(())
    }
}
