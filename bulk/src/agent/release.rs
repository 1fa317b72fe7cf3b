use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::BulkResult;
use crate::metrics::BULK_RESOURCES_UNLOCKED_TOTAL;
use crate::orchestrator::{BulkJobRunner, OperationStatus};
use crate::store::tracker::TrackerStore;
use crate::tracker::CompletionTracker;
use crate::types::OperationId;

/// A resource locked while bulk operations attached to it are in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedResource {
    pub id: String,
    pub operation_ids: BTreeSet<OperationId>,
}

/// Proof that the caller holds the lock of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLock {
    pub resource_id: String,
    pub token: uuid::Uuid,
}

/// Store of resources that bulk operations lock.
#[async_trait::async_trait]
pub trait LockedResourceRegistry: Send + Sync {
    async fn locked_resources(&self) -> BulkResult<Vec<LockedResource>>;

    /// Takes over the lock of a resource. Returns `None` if it cannot be taken right now.
    async fn acquire_lock(&self, resource_id: &str) -> BulkResult<Option<ResourceLock>>;

    async fn detach_operations(
        &self,
        resource_id: &str,
        operation_ids: &[OperationId],
    ) -> BulkResult<()>;

    /// Recomputes derived data of the resource, such as its member count.
    async fn refresh(&self, resource_id: &str) -> BulkResult<()>;

    async fn unlock(&self, lock: ResourceLock) -> BulkResult<()>;
}

/// Unlocks resources once every bulk operation attached to them has been released.
///
/// Operations that are released but still attached are detached as soon as they are seen,
/// even when the resource stays locked because of other operations.
pub struct ResourceReleaseAgent<S> {
    registry: Arc<dyn LockedResourceRegistry>,
    tracker: CompletionTracker<S>,
    runner: Arc<BulkJobRunner>,
    disabled: AtomicBool,
}

impl<S> ResourceReleaseAgent<S>
where
    S: TrackerStore + Send + Sync,
{
    pub fn new(
        registry: Arc<dyn LockedResourceRegistry>,
        tracker: CompletionTracker<S>,
        runner: Arc<BulkJobRunner>,
    ) -> Self {
        Self {
            registry,
            tracker,
            runner,
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Disables the agent, for example while indexing is stopping.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Release);
    }

    /// Runs one pass over the locked resources and returns how many were unlocked.
    pub async fn run_once(&self) -> BulkResult<usize> {
        if self.is_disabled() {
            debug!("resource release agent is disabled");
            return Ok(0);
        }

        let mut unlocked = 0;
        for resource in self.registry.locked_resources().await? {
            if self.release_resource(&resource).await? {
                unlocked += 1;
            }
        }

        Ok(unlocked)
    }

    async fn release_resource(&self, resource: &LockedResource) -> BulkResult<bool> {
        if resource.operation_ids.is_empty() {
            return Ok(false);
        }

        let processing = resource.operation_ids.iter().any(|operation_id| {
            self.runner.operation_status(*operation_id) == Some(OperationStatus::Processing)
        });
        if processing {
            debug!(resource = %resource.id, "resource has operations still processing");
            return Ok(false);
        }

        let mut released = Vec::new();
        for operation_id in &resource.operation_ids {
            if !self.tracker.is_registered(*operation_id).await? {
                released.push(*operation_id);
            }
        }

        if released.len() < resource.operation_ids.len() {
            if !released.is_empty() {
                self.registry
                    .detach_operations(&resource.id, &released)
                    .await?;
                debug!(
                    resource = %resource.id,
                    detached = released.len(),
                    "detached released operations from resource"
                );
            }

            return Ok(false);
        }

        let Some(lock) = self.registry.acquire_lock(&resource.id).await? else {
            warn!(resource = %resource.id, "could not acquire the resource lock");
            return Ok(false);
        };

        self.registry
            .detach_operations(&resource.id, &released)
            .await?;
        self.registry.refresh(&resource.id).await?;
        self.registry.unlock(lock).await?;

        counter!(BULK_RESOURCES_UNLOCKED_TOTAL).increment(1);
        info!(resource = %resource.id, "resource unlocked");

        Ok(true)
    }
}
