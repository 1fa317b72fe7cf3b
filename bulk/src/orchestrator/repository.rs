use std::fmt;
use std::time::Duration;

use crate::error::BulkResult;
use crate::orchestrator::Record;
use crate::scope::BatchScope;
use crate::types::RecordId;

/// Identity of the holder of a record lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseOwner {
    pub worker: String,
    pub job_name: String,
}

impl LeaseOwner {
    pub fn new(worker: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            job_name: job_name.into(),
        }
    }
}

impl fmt::Display for LeaseOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.worker, self.job_name)
    }
}

/// Result of a leased load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    NotFound,
    /// The record was loaded and the lease is now held by the caller.
    Loaded(Record),
    /// Another owner kept the lease for the whole timeout.
    LockFailure,
}

/// Store of destination records with time-bounded leases.
#[async_trait::async_trait]
pub trait RecordRepository: Send + Sync {
    /// Loads the record with `identifier`, waiting up to `timeout` for a conflicting lease.
    async fn try_load_with_lease(
        &self,
        identifier: &str,
        owner: &LeaseOwner,
        timeout: Duration,
    ) -> BulkResult<LoadOutcome>;

    /// Creates a new, not yet persisted record.
    async fn create_record(&self, id: RecordId, identifier: &str) -> BulkResult<Record>;

    /// Persists `record`, optionally releasing the lease held by `owner`.
    ///
    /// Downstream work produced by the save is queued within `scope`. Returns `false` if the
    /// record could not be saved.
    async fn save_record(
        &self,
        record: &Record,
        owner: &LeaseOwner,
        release_lease: bool,
        scope: &BatchScope,
    ) -> BulkResult<bool>;

    async fn release_lease(&self, record_id: RecordId, owner: &LeaseOwner) -> BulkResult<()>;
}
