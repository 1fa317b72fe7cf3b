use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bail;
use crate::error::{BulkResult, ErrorKind};
use crate::index::JobScheduler;
use crate::orchestrator::{BulkJob, JobStatus};
use crate::types::OperationId;

/// Status of a bulk operation as seen from the jobs hosting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// The job is queued or running.
    Processing,
    Finished,
    Failed,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<String, Arc<BulkJob>>,
    handles: HashMap<String, JoinHandle<()>>,
}

/// Hosts bulk jobs on tokio tasks and answers scheduler queries about them.
///
/// Ended jobs are kept, and their names stay taken, until
/// [`BulkJobRunner::prune_ended_jobs`] drops them.
#[derive(Debug, Default)]
pub struct BulkJobRunner {
    inner: Mutex<Inner>,
}

impl BulkJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `job` and runs `work` for it in the background.
    ///
    /// Fails with [`ErrorKind::JobAlreadyExists`] if a job with the same name was started
    /// before.
    pub fn start<F>(&self, job: Arc<BulkJob>, work: F) -> BulkResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner();

        if inner.jobs.contains_key(job.name()) {
            bail!(
                ErrorKind::JobAlreadyExists,
                "A job with this name already exists",
                job.name()
            );
        }

        info!(job = %job.name(), operation_id = %job.operation_id(), "starting bulk job");

        let handle = tokio::spawn(work);
        inner.jobs.insert(job.name().to_string(), job.clone());
        inner.handles.insert(job.name().to_string(), handle);

        Ok(())
    }

    /// Forgets every job that reached a terminal status and whose task has ended.
    ///
    /// Pruned names can be submitted again. Returns how many jobs were dropped.
    pub fn prune_ended_jobs(&self) -> usize {
        let mut inner = self.inner();
        let Inner { jobs, handles } = &mut *inner;

        let before = jobs.len();
        jobs.retain(|name, job| {
            let task_ended = handles
                .get(name)
                .is_none_or(|handle| handle.is_finished());
            if job.status().is_terminal() && task_ended {
                handles.remove(name);
                return false;
            }
            true
        });

        let pruned = before - jobs.len();
        if pruned > 0 {
            info!(pruned, "pruned ended bulk jobs");
        }

        pruned
    }

    pub fn get_job(&self, name: &str) -> Option<Arc<BulkJob>> {
        self.inner().jobs.get(name).cloned()
    }

    pub fn job_exists(&self, name: &str) -> bool {
        self.inner().jobs.contains_key(name)
    }

    pub fn job_by_operation(&self, operation_id: OperationId) -> Option<Arc<BulkJob>> {
        self.inner()
            .jobs
            .values()
            .find(|job| job.operation_id() == operation_id)
            .cloned()
    }

    pub fn jobs(&self) -> Vec<Arc<BulkJob>> {
        self.inner().jobs.values().cloned().collect()
    }

    pub fn operation_status(&self, operation_id: OperationId) -> Option<OperationStatus> {
        let job = self.job_by_operation(operation_id)?;

        let status = match job.status() {
            JobStatus::Queued | JobStatus::Running => OperationStatus::Processing,
            JobStatus::Finished => OperationStatus::Finished,
            JobStatus::Failed => OperationStatus::Failed,
        };

        Some(status)
    }

    /// Waits for the task of the job named `name` to end.
    ///
    /// Returns immediately if the job was already waited for. A panicking job is reported
    /// as [`ErrorKind::BulkJobPanic`].
    pub async fn wait(&self, name: &str) -> BulkResult<()> {
        let handle = {
            let mut inner = self.inner();
            if !inner.jobs.contains_key(name) {
                bail!(ErrorKind::JobNotFound, "No job with this name exists", name);
            }
            inner.handles.remove(name)
        };

        let Some(handle) = handle else {
            return Ok(());
        };

        if let Err(err) = handle.await {
            error!(job = %name, error = %err, "bulk job task failed");
            if let Some(job) = self.get_job(name) {
                job.set_status(JobStatus::Failed);
            }

            bail!(ErrorKind::BulkJobPanic, "Bulk job panicked", err);
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl JobScheduler for BulkJobRunner {
    async fn is_running(&self, job_name: &str) -> bool {
        self.get_job(job_name)
            .is_some_and(|job| job.status() == JobStatus::Running)
    }

    async fn is_queued(&self, job_name: &str) -> bool {
        self.get_job(job_name)
            .is_some_and(|job| job.status() == JobStatus::Queued)
    }
}
