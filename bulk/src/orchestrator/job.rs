use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::BulkError;
use crate::orchestrator::SourceRecord;
use crate::types::{OperationId, RecordId};

/// Lifecycle of a bulk job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    /// The job stopped on a fatal error; see [`BulkJob::error`].
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        };
        f.write_str(status)
    }
}

/// Outcome of one input record.
#[derive(Debug, Clone)]
pub enum RecordResult {
    Success {
        record_id: RecordId,
        identifier: String,
    },
    Failure {
        cause: BulkError,
        source: SourceRecord,
    },
}

impl RecordResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RecordResult::Success { .. })
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    processed: usize,
    results: Vec<RecordResult>,
    error: Option<BulkError>,
}

/// A bulk job and its progress, shared between the runner and observers.
#[derive(Debug)]
pub struct BulkJob {
    name: String,
    operation_id: OperationId,
    state: Mutex<JobState>,
}

impl BulkJob {
    pub fn new(name: impl Into<String>, operation_id: OperationId) -> Self {
        Self {
            name: name.into(),
            operation_id,
            state: Mutex::new(JobState {
                status: JobStatus::Queued,
                processed: 0,
                results: Vec::new(),
                error: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    /// Number of records processed so far, failed ones included.
    pub fn processed(&self) -> usize {
        self.state().processed
    }

    pub fn results(&self) -> Vec<RecordResult> {
        self.state().results.clone()
    }

    /// The fatal error that failed the job, if any.
    pub fn error(&self) -> Option<BulkError> {
        self.state().error.clone()
    }

    pub(crate) fn set_status(&self, status: JobStatus) {
        self.state().status = status;
    }

    /// Appends a record result and counts the record as processed.
    pub(crate) fn record(&self, result: RecordResult) {
        let mut state = self.state();
        state.processed += 1;
        state.results.push(result);
    }

    pub(crate) fn fail(&self, error: BulkError) {
        let mut state = self.state();
        state.status = JobStatus::Failed;
        state.error = Some(error);
    }
}
