//! Assembly of the queue, tracker, observer, coordinator and orchestrator.

use std::sync::Arc;
use std::time::Duration;

use bulk_config::shared::BulkConfig;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::agent::{LockedResourceRegistry, ResourceReleaseAgent};
use crate::barrier::ConsistencyBarrierCoordinator;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::BulkResult;
use crate::index::{IndexCycleObserver, JobScheduler};
use crate::orchestrator::{
    BulkJobRunner, BulkUpdateManager, OperationHandle, Pipelines, RecordRepository, SourceSet,
};
use crate::queue::WorkQueue;
use crate::store::queue::QueueStore;
use crate::store::tracker::TrackerStore;
use crate::tracker::CompletionTracker;
use crate::workers::{
    OperationReleaseWorker, QueueConsumer, ReleaseAgentWorker, WorkItemHandler, WorkerHandle,
};

/// A bulk update service: one work queue gated by the consistency barrier of one index.
///
/// The coordinator is registered on both the queue and the orchestrator, so batches
/// submitted here are tracked until an index cycle has covered them.
pub struct BulkService<Q, T, R> {
    config: BulkConfig,
    started_at: DateTime<Utc>,
    queue: Arc<WorkQueue<Q>>,
    coordinator: Arc<ConsistencyBarrierCoordinator<T>>,
    manager: BulkUpdateManager<R>,
}

impl<Q, T, R> BulkService<Q, T, R>
where
    Q: QueueStore + Send + Sync + 'static,
    T: TrackerStore + Clone + Send + Sync + 'static,
    R: RecordRepository + 'static,
{
    /// Builds the service. `scheduler` is the scheduler hosting the index rebuild jobs.
    pub fn new(
        config: BulkConfig,
        queue_store: Q,
        tracker_store: T,
        repository: Arc<R>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> BulkResult<Self> {
        config.validate()?;

        let observer = Arc::new(IndexCycleObserver::new(&config.observer, scheduler));
        let coordinator = Arc::new(ConsistencyBarrierCoordinator::new(
            config.queue.pool_name.clone(),
            CompletionTracker::new(tracker_store),
            observer,
        ));
        let queue = Arc::new(
            WorkQueue::new(config.queue.clone(), queue_store).with_listener(coordinator.clone()),
        );
        let manager = BulkUpdateManager::new(
            config.bulk_update.clone(),
            repository,
            Arc::new(BulkJobRunner::new()),
        )
        .with_listener(coordinator.clone());

        info!(
            pool = %config.queue.pool_name,
            index = %config.observer.index_name,
            "bulk service created"
        );

        Ok(Self {
            config,
            started_at: Utc::now(),
            queue,
            coordinator,
            manager,
        })
    }

    pub fn with_pipelines(mut self, pipelines: Pipelines) -> Self {
        self.manager = self.manager.with_pipelines(pipelines);
        self
    }

    pub fn queue(&self) -> &Arc<WorkQueue<Q>> {
        &self.queue
    }

    pub fn coordinator(&self) -> &Arc<ConsistencyBarrierCoordinator<T>> {
        &self.coordinator
    }

    pub fn observer(&self) -> &Arc<IndexCycleObserver> {
        self.coordinator.observer()
    }

    pub fn tracker(&self) -> &CompletionTracker<T> {
        self.coordinator.tracker()
    }

    pub fn runner(&self) -> &Arc<BulkJobRunner> {
        self.manager.runner()
    }

    /// Drops ended jobs from the runner so their set names can be submitted again.
    pub fn prune_ended_jobs(&self) -> usize {
        self.runner().prune_ended_jobs()
    }

    pub fn submit_batch(
        &self,
        set: SourceSet,
        context_data: impl Into<String>,
    ) -> BulkResult<OperationHandle> {
        self.manager.submit_batch(set, context_data)
    }

    /// Starts `consumers` queue consumers feeding `handler`.
    pub fn start_consumers<H>(
        &self,
        handler: Arc<H>,
        consumers: usize,
        shutdown_rx: &ShutdownRx,
    ) -> Vec<WorkerHandle>
    where
        H: WorkItemHandler + 'static,
    {
        let poll_interval = Duration::from_millis(self.config.queue.poll_interval_ms);

        (0..consumers)
            .map(|_| {
                QueueConsumer::new(
                    self.queue.clone(),
                    handler.clone(),
                    poll_interval,
                    shutdown_rx.clone(),
                )
                .start()
            })
            .collect()
    }

    /// Starts the worker releasing operations after index cycles.
    pub fn start_release_worker(&self, shutdown_rx: &ShutdownRx) -> WorkerHandle {
        OperationReleaseWorker::new(
            self.coordinator.clone(),
            self.started_at,
            shutdown_rx.clone(),
        )
        .start()
    }

    /// Starts the resource release agent, unless it is disabled in the configuration.
    pub fn start_release_agent(
        &self,
        registry: Arc<dyn LockedResourceRegistry>,
        shutdown_rx: &ShutdownRx,
    ) -> Option<WorkerHandle> {
        if !self.config.release_agent.enabled {
            info!("resource release agent is disabled");
            return None;
        }

        let agent = Arc::new(ResourceReleaseAgent::new(
            registry,
            self.tracker().clone(),
            self.runner().clone(),
        ));

        Some(
            ReleaseAgentWorker::new(
                agent,
                Duration::from_millis(self.config.release_agent.interval_ms),
                shutdown_rx.clone(),
            )
            .start(),
        )
    }
}
