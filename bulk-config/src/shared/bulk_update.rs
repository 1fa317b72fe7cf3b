use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings of the bulk update orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BulkUpdateConfig {
    /// Prefix prepended to the source set name to build the job name.
    #[serde(default = "default_job_name_prefix")]
    pub job_name_prefix: String,
    /// Maximum time a record load waits for a conflicting lease, in milliseconds.
    #[serde(default = "default_lease_timeout_ms")]
    pub lease_timeout_ms: u64,
    /// Name of the worker that owns leases taken by bulk jobs.
    #[serde(default = "default_lease_worker")]
    pub lease_worker: String,
}

impl BulkUpdateConfig {
    pub const DEFAULT_JOB_NAME_PREFIX: &'static str = "bulk_update:";

    pub const DEFAULT_LEASE_TIMEOUT_MS: u64 = 60_000;

    pub const DEFAULT_LEASE_WORKER: &'static str = "bulk_update_worker";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lease_timeout_ms == 0 {
            return Err(ValidationError::invalid(
                "bulk_update.lease_timeout_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for BulkUpdateConfig {
    fn default() -> Self {
        Self {
            job_name_prefix: default_job_name_prefix(),
            lease_timeout_ms: default_lease_timeout_ms(),
            lease_worker: default_lease_worker(),
        }
    }
}

fn default_job_name_prefix() -> String {
    BulkUpdateConfig::DEFAULT_JOB_NAME_PREFIX.to_string()
}

fn default_lease_timeout_ms() -> u64 {
    BulkUpdateConfig::DEFAULT_LEASE_TIMEOUT_MS
}

fn default_lease_worker() -> String {
    BulkUpdateConfig::DEFAULT_LEASE_WORKER.to_string()
}
