use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bulk_config::shared::IndexObserverConfig;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::BulkResult;

const FINISHED_CHANNEL_CAPACITY: usize = 64;

/// Returns the name of the scheduler job that rebuilds `index_name`.
pub fn index_job_name(index_name: &str) -> String {
    format!("index_update:{index_name}")
}

/// Queries the scheduler hosting background jobs.
#[async_trait::async_trait]
pub trait JobScheduler: Send + Sync {
    async fn is_running(&self, job_name: &str) -> bool;

    async fn is_queued(&self, job_name: &str) -> bool;
}

/// An upstream data source feeding the index.
#[async_trait::async_trait]
pub trait DataSourceProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Returns whether the source holds changes the indexer has not consumed yet.
    async fn has_pending_items(&self) -> BulkResult<bool>;
}

/// Boundaries of the most recently completed index cycle.
///
/// Both are `None` until a cycle finished in this process lifetime. `started_at` is also
/// `None` if the cycle started before the observer was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCycleWindow {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Published whenever a cycle of the tracked index finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCycleFinished {
    pub index_name: String,
    pub window: IndexCycleWindow,
}

#[derive(Debug, Default)]
struct CycleTimes {
    last_started: Option<DateTime<Utc>>,
    last_complete: IndexCycleWindow,
}

/// Tracks start and end of the rebuild cycles of one index.
///
/// The scheduler reports every job start and finish through [`IndexCycleObserver::job_started`]
/// and [`IndexCycleObserver::job_finished`]; events of other jobs are ignored.
pub struct IndexCycleObserver {
    index_name: String,
    job_name: String,
    scheduler: Arc<dyn JobScheduler>,
    probes: Vec<Arc<dyn DataSourceProbe>>,
    times: Mutex<CycleTimes>,
    had_update: AtomicBool,
    finished_tx: broadcast::Sender<IndexCycleFinished>,
}

impl IndexCycleObserver {
    pub fn new(config: &IndexObserverConfig, scheduler: Arc<dyn JobScheduler>) -> Self {
        let (finished_tx, _) = broadcast::channel(FINISHED_CHANNEL_CAPACITY);

        Self {
            index_name: config.index_name.clone(),
            job_name: index_job_name(&config.index_name),
            scheduler,
            probes: Vec::new(),
            times: Mutex::new(CycleTimes::default()),
            had_update: AtomicBool::new(false),
            finished_tx,
        }
    }

    /// Tracks the data sources accepted by `filter` for [`IndexCycleObserver::has_pending_work`].
    pub fn with_probes<F>(
        mut self,
        probes: impl IntoIterator<Item = Arc<dyn DataSourceProbe>>,
        filter: F,
    ) -> Self
    where
        F: Fn(&dyn DataSourceProbe) -> bool,
    {
        self.probes
            .extend(probes.into_iter().filter(|probe| filter(probe.as_ref())));
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    fn is_tracked_job(&self, job_name: &str) -> bool {
        job_name.eq_ignore_ascii_case(&self.job_name)
    }

    fn times(&self) -> MutexGuard<'_, CycleTimes> {
        self.times.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles a job start reported by the scheduler.
    pub fn job_started(&self, job_name: &str) {
        if !self.is_tracked_job(job_name) {
            return;
        }

        let now = Utc::now();
        self.times().last_started = Some(now);

        debug!(index = %self.index_name, started_at = %now, "index cycle started");
    }

    /// Handles a job finish reported by the scheduler.
    ///
    /// For the tracked job this closes the cycle opened by the last start and notifies the
    /// subscribers. Returns the finished event, or `None` for other jobs.
    pub fn job_finished(&self, job_name: &str) -> Option<IndexCycleFinished> {
        if !self.is_tracked_job(job_name) {
            return None;
        }

        let window = {
            let mut times = self.times();
            times.last_complete = IndexCycleWindow {
                started_at: times.last_started,
                ended_at: Some(Utc::now()),
            };
            times.last_complete
        };
        self.had_update.store(true, Ordering::Release);

        info!(
            index = %self.index_name,
            started_at = ?window.started_at,
            ended_at = ?window.ended_at,
            "index cycle finished"
        );

        let event = IndexCycleFinished {
            index_name: self.index_name.clone(),
            window,
        };
        // Having no subscriber is fine.
        let _ = self.finished_tx.send(event.clone());

        Some(event)
    }

    pub fn time_of_last_complete_job(&self) -> IndexCycleWindow {
        self.times().last_complete
    }

    /// Returns whether a cycle of the tracked index finished in this process lifetime.
    pub fn had_update(&self) -> bool {
        self.had_update.load(Ordering::Acquire)
    }

    pub async fn is_cycle_queued_or_running(&self) -> bool {
        self.scheduler.is_running(&self.job_name).await
            || self.scheduler.is_queued(&self.job_name).await
    }

    pub async fn is_cycle_running(&self) -> bool {
        self.scheduler.is_running(&self.job_name).await
    }

    /// Returns whether any tracked data source has items the indexer has not consumed.
    pub async fn has_pending_work(&self) -> BulkResult<bool> {
        for probe in &self.probes {
            if probe.has_pending_items().await? {
                debug!(index = %self.index_name, source = probe.name(), "data source has pending items");
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Subscribes to finished cycles of the tracked index.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexCycleFinished> {
        self.finished_tx.subscribe()
    }
}
