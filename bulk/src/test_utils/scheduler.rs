use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::index::JobScheduler;

#[derive(Debug, Default)]
struct Jobs {
    running: HashSet<String>,
    queued: HashSet<String>,
}

/// A job scheduler whose job states are set by the test.
#[derive(Debug, Default)]
pub struct ManualJobScheduler {
    jobs: Mutex<Jobs>,
}

impl ManualJobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, job_name: &str, running: bool) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if running {
            jobs.running.insert(job_name.to_string());
        } else {
            jobs.running.remove(job_name);
        }
    }

    pub fn set_queued(&self, job_name: &str, queued: bool) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if queued {
            jobs.queued.insert(job_name.to_string());
        } else {
            jobs.queued.remove(job_name);
        }
    }
}

#[async_trait::async_trait]
impl JobScheduler for ManualJobScheduler {
    async fn is_running(&self, job_name: &str) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.running.contains(job_name)
    }

    async fn is_queued(&self, job_name: &str) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.queued.contains(job_name)
    }
}
