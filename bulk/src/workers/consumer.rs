use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{BulkResult, ErrorKind};
#[cfg(feature = "failpoints")]
use crate::failpoints::{QUEUE_CHECK_IN_FP, bulk_fail_point};
use crate::queue::{WorkItem, WorkQueue};
use crate::store::queue::QueueStore;
use crate::workers::WorkerHandle;

/// Processes items checked out of a queue.
#[async_trait::async_trait]
pub trait WorkItemHandler: Send + Sync {
    /// Processes one item. An error leaves the item queued so it is retried later.
    async fn handle(&self, item: &WorkItem) -> BulkResult<()>;
}

/// Worker that drains a queue into a [`WorkItemHandler`].
///
/// Due items are processed back to back; when none is due the worker sleeps for the poll
/// interval. Handled items are checked in, failed ones are left for the queue's retry.
pub struct QueueConsumer<Q, H> {
    queue: Arc<WorkQueue<Q>>,
    handler: Arc<H>,
    poll_interval: Duration,
    shutdown_rx: ShutdownRx,
}

impl<Q, H> QueueConsumer<Q, H>
where
    Q: QueueStore + Send + Sync + 'static,
    H: WorkItemHandler + 'static,
{
    pub fn new(
        queue: Arc<WorkQueue<Q>>,
        handler: Arc<H>,
        poll_interval: Duration,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            queue,
            handler,
            poll_interval,
            shutdown_rx,
        }
    }

    pub fn start(self) -> WorkerHandle {
        let join_handle = tokio::spawn(self.run());
        WorkerHandle::new("queue_consumer", ErrorKind::QueueConsumerPanic, join_handle)
    }

    async fn run(mut self) -> BulkResult<()> {
        info!(pool = %self.queue.pool_name(), "starting queue consumer");

        loop {
            if self.shutdown_rx.is_shutdown() {
                break;
            }

            let processed = match self.queue.try_checkout().await {
                Ok(Some(item)) => {
                    self.process(item).await;
                    true
                }
                Ok(None) => false,
                Err(err) => {
                    error!(pool = %self.queue.pool_name(), error = %err, "checkout failed");
                    false
                }
            };

            if processed {
                continue;
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = self.shutdown_rx.wait_for_shutdown() => break,
            }
        }

        info!(pool = %self.queue.pool_name(), "queue consumer stopped");

        Ok(())
    }

    async fn process(&self, item: WorkItem) {
        if let Err(err) = self.handler.handle(&item).await {
            warn!(
                pool = %self.queue.pool_name(),
                key = %item.key,
                attempts = item.attempts,
                error = %err,
                "work item failed, leaving it for retry"
            );
            return;
        }

        if let Err(err) = self.check_in(&item).await {
            warn!(pool = %self.queue.pool_name(), key = %item.key, error = %err, "check in failed");
            return;
        }

        debug!(pool = %self.queue.pool_name(), key = %item.key, "work item processed");
    }

    async fn check_in(&self, item: &WorkItem) -> BulkResult<bool> {
        #[cfg(feature = "failpoints")]
        bulk_fail_point(QUEUE_CHECK_IN_FP)?;

        self.queue.check_in(item).await
    }
}
