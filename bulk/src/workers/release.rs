use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::barrier::ConsistencyBarrierCoordinator;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{BulkResult, ErrorKind};
use crate::index::IndexCycleFinished;
use crate::store::tracker::TrackerStore;
use crate::workers::WorkerHandle;

/// Worker releasing complete operations whenever an index cycle finishes.
///
/// On start it also releases the operations that completed before `process_started_at`
/// if no index cycle is pending to do so.
pub struct OperationReleaseWorker<S> {
    coordinator: Arc<ConsistencyBarrierCoordinator<S>>,
    process_started_at: DateTime<Utc>,
    shutdown_rx: ShutdownRx,
}

impl<S> OperationReleaseWorker<S>
where
    S: TrackerStore + Send + Sync + 'static,
{
    pub fn new(
        coordinator: Arc<ConsistencyBarrierCoordinator<S>>,
        process_started_at: DateTime<Utc>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            coordinator,
            process_started_at,
            shutdown_rx,
        }
    }

    pub fn start(self) -> WorkerHandle {
        let join_handle = tokio::spawn(self.run());
        WorkerHandle::new(
            "operation_release",
            ErrorKind::ReleaseWorkerPanic,
            join_handle,
        )
    }

    async fn run(mut self) -> BulkResult<()> {
        let observer = self.coordinator.observer().clone();
        // Subscribe first so that a cycle finishing during the cleanup is not missed.
        let mut finished_rx = observer.subscribe();

        info!(index = %observer.index_name(), "starting operation release worker");

        if let Err(err) = self
            .coordinator
            .startup_cleanup(self.process_started_at)
            .await
        {
            warn!(error = %err, "startup cleanup of complete operations failed");
        }

        loop {
            let event = tokio::select! {
                received = finished_rx.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed index cycle events, using the latest cycle");
                        IndexCycleFinished {
                            index_name: observer.index_name().to_string(),
                            window: observer.time_of_last_complete_job(),
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = self.shutdown_rx.wait_for_shutdown() => break,
            };

            match self.coordinator.on_cycle_finished(&event).await {
                Ok(released) => {
                    info!(index = %event.index_name, released, "released operations after index cycle");
                }
                Err(err) => {
                    error!(index = %event.index_name, error = %err, "failed to release operations");
                }
            }
        }

        info!(index = %observer.index_name(), "operation release worker stopped");

        Ok(())
    }
}
