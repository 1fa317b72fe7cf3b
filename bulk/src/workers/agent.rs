use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::agent::ResourceReleaseAgent;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{BulkResult, ErrorKind};
use crate::store::tracker::TrackerStore;
use crate::workers::WorkerHandle;

/// Worker running the [`ResourceReleaseAgent`] on a fixed interval until shutdown.
pub struct ReleaseAgentWorker<S> {
    agent: Arc<ResourceReleaseAgent<S>>,
    interval: Duration,
    shutdown_rx: ShutdownRx,
}

impl<S> ReleaseAgentWorker<S>
where
    S: TrackerStore + Send + Sync + 'static,
{
    pub fn new(
        agent: Arc<ResourceReleaseAgent<S>>,
        interval: Duration,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            agent,
            interval,
            shutdown_rx,
        }
    }

    pub fn start(self) -> WorkerHandle {
        let join_handle = tokio::spawn(self.run());
        WorkerHandle::new(
            "release_agent",
            ErrorKind::ReleaseAgentPanic,
            join_handle,
        )
    }

    async fn run(mut self) -> BulkResult<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "starting resource release agent");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown_rx.wait_for_shutdown() => break,
            }

            match self.agent.run_once().await {
                Ok(0) => {}
                Ok(unlocked) => info!(unlocked, "resource release agent pass completed"),
                Err(err) => error!(error = %err, "resource release agent pass failed"),
            }
        }

        info!("resource release agent stopped");

        Ok(())
    }
}
