use std::sync::Arc;
use std::time::Duration;

use bulk_config::shared::BulkUpdateConfig;
use metrics::counter;
use tracing::{error, info, warn};

use crate::bail;
use crate::error::{BulkError, BulkResult, ErrorKind};
#[cfg(feature = "failpoints")]
use crate::failpoints::{BATCH_BEFORE_FINISHED_FP, PROCESS_RECORD_BEFORE_SAVE_FP, bulk_fail_point};
use crate::metrics::{BULK_RECORDS_PROCESSED_TOTAL, OUTCOME_LABEL};
use crate::orchestrator::{
    BatchListener, BulkJob, BulkJobRunner, JobStatus, LeaseOwner, LoadOutcome, PipelineContext,
    Pipelines, RecordRepository, RecordResult, SourceRecord, SourceSet,
};
use crate::scope::BatchScope;
use crate::types::{OperationId, RecordId};

/// Handle to a submitted batch.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    job: Arc<BulkJob>,
    runner: Arc<BulkJobRunner>,
}

impl OperationHandle {
    pub fn operation_id(&self) -> OperationId {
        self.job.operation_id()
    }

    pub fn job_name(&self) -> &str {
        self.job.name()
    }

    pub fn job(&self) -> &Arc<BulkJob> {
        &self.job
    }

    pub fn status(&self) -> JobStatus {
        self.job.status()
    }

    /// Waits for the job to end and returns it.
    pub async fn wait(&self) -> BulkResult<Arc<BulkJob>> {
        self.runner.wait(self.job.name()).await?;

        Ok(self.job.clone())
    }
}

/// Submits bulk update batches and drives each of them as a job.
///
/// For every input record the job loads the destination record under a lease, or creates
/// it, runs the update pipelines, saves it and records a per-record result. Batch start and
/// end are signalled to the registered [`BatchListener`]s.
pub struct BulkUpdateManager<R> {
    config: Arc<BulkUpdateConfig>,
    repository: Arc<R>,
    pipelines: Pipelines,
    listeners: Vec<Arc<dyn BatchListener>>,
    runner: Arc<BulkJobRunner>,
}

impl<R> Clone for BulkUpdateManager<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            repository: self.repository.clone(),
            pipelines: self.pipelines.clone(),
            listeners: self.listeners.clone(),
            runner: self.runner.clone(),
        }
    }
}

impl<R> BulkUpdateManager<R>
where
    R: RecordRepository + 'static,
{
    pub fn new(config: BulkUpdateConfig, repository: Arc<R>, runner: Arc<BulkJobRunner>) -> Self {
        Self {
            config: Arc::new(config),
            repository,
            pipelines: Pipelines::default(),
            listeners: Vec::new(),
            runner,
        }
    }

    pub fn with_pipelines(mut self, pipelines: Pipelines) -> Self {
        self.pipelines = pipelines;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn BatchListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn runner(&self) -> &Arc<BulkJobRunner> {
        &self.runner
    }

    pub fn job_name(&self, set_name: &str) -> String {
        format!("{}{set_name}", self.config.job_name_prefix)
    }

    /// Starts a job processing `set` under a new operation id.
    ///
    /// Fails with [`ErrorKind::JobAlreadyExists`] if a set with the same name was submitted
    /// before.
    pub fn submit_batch(
        &self,
        set: SourceSet,
        context_data: impl Into<String>,
    ) -> BulkResult<OperationHandle> {
        let job_name = self.job_name(&set.name);

        if self.runner.job_exists(&job_name) {
            bail!(
                ErrorKind::JobAlreadyExists,
                "A job with this name already exists",
                job_name
            );
        }

        let job = Arc::new(BulkJob::new(job_name, OperationId::new()));
        let context_data = context_data.into();

        let manager = self.clone();
        let running = job.clone();
        self.runner.start(job.clone(), async move {
            manager.process_set(running, set, context_data).await;
        })?;

        Ok(OperationHandle {
            job,
            runner: self.runner.clone(),
        })
    }

    async fn process_set(&self, job: Arc<BulkJob>, set: SourceSet, context_data: String) {
        job.set_status(JobStatus::Running);

        let scope = BatchScope::new(job.operation_id());
        let owner = LeaseOwner::new(&self.config.lease_worker, job.name());

        info!(
            job = %job.name(),
            operation_id = %scope.operation_id(),
            records = set.records.len(),
            "bulk job started"
        );

        if let Err(err) = self.notify_batch_starting(&scope).await {
            error!(job = %job.name(), error = %err, "bulk job could not start its batch");
            job.fail(err);
            return;
        }

        let processed = self
            .process_records(&job, &set.records, &scope, &owner, &context_data)
            .await;
        let finished = self.notify_batch_finished(&scope).await;

        match processed.and(finished) {
            Ok(()) => {
                job.set_status(JobStatus::Finished);
                info!(
                    job = %job.name(),
                    processed = job.processed(),
                    queued = scope.queued_count(),
                    "bulk job finished"
                );
            }
            Err(err) => {
                error!(job = %job.name(), error = %err, "bulk job failed");
                job.fail(err);
            }
        }
    }

    async fn notify_batch_starting(&self, scope: &BatchScope) -> BulkResult<()> {
        for listener in &self.listeners {
            listener.on_batch_starting(scope).await?;
        }

        Ok(())
    }

    /// Notifies every listener even if one fails; the failures are returned together.
    async fn notify_batch_finished(&self, scope: &BatchScope) -> BulkResult<()> {
        let mut errors = Vec::new();

        #[cfg(feature = "failpoints")]
        if let Err(err) = bulk_fail_point(BATCH_BEFORE_FINISHED_FP) {
            errors.push(err);
        }

        for listener in &self.listeners {
            if let Err(err) = listener
                .on_batch_finished(scope, scope.queued_count())
                .await
            {
                errors.push(err);
            }
        }

        if !errors.is_empty() {
            return Err(BulkError::from(errors));
        }

        Ok(())
    }

    /// Processes every record, recording a result for each.
    ///
    /// Only a lease conflict stops the loop; it is returned as the job's error.
    async fn process_records(
        &self,
        job: &BulkJob,
        records: &[SourceRecord],
        scope: &BatchScope,
        owner: &LeaseOwner,
        context_data: &str,
    ) -> BulkResult<()> {
        for source in records {
            match self.process_record(source, scope, owner, context_data).await {
                Ok(record_id) => {
                    counter!(BULK_RECORDS_PROCESSED_TOTAL, OUTCOME_LABEL => "success").increment(1);
                    job.record(RecordResult::Success {
                        record_id,
                        identifier: source.identifier.clone(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::LeaseConflict => {
                    return Err(err);
                }
                Err(err) => {
                    counter!(BULK_RECORDS_PROCESSED_TOTAL, OUTCOME_LABEL => "failure").increment(1);
                    warn!(
                        job = %job.name(),
                        identifier = %source.identifier,
                        error = %err,
                        "record update failed"
                    );
                    job.record(RecordResult::Failure {
                        cause: err,
                        source: source.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    async fn process_record(
        &self,
        source: &SourceRecord,
        scope: &BatchScope,
        owner: &LeaseOwner,
        context_data: &str,
    ) -> BulkResult<RecordId> {
        if source.identifier.is_empty() {
            bail!(
                ErrorKind::MissingIdentifier,
                "The source record has no identifier"
            );
        }

        let timeout = Duration::from_millis(self.config.lease_timeout_ms);
        let (record, leased) = match self
            .repository
            .try_load_with_lease(&source.identifier, owner, timeout)
            .await?
        {
            LoadOutcome::NotFound => {
                let record = self
                    .repository
                    .create_record(RecordId::new(), &source.identifier)
                    .await?;
                (record, false)
            }
            LoadOutcome::Loaded(record) => (record, true),
            LoadOutcome::LockFailure => bail!(
                ErrorKind::LeaseConflict,
                "The destination record is leased by another owner",
                source.identifier.clone()
            ),
        };

        let record_id = record.id;
        let mut context = PipelineContext::new(record, source.clone(), context_data);

        if let Err(err) = self.prepare_and_save(&mut context, scope, owner).await {
            if leased {
                if let Err(release_err) = self.repository.release_lease(record_id, owner).await {
                    warn!(%record_id, error = %release_err, "failed to release the record lease");
                }
            }

            return Err(err);
        }

        self.pipelines.post_persist.run(&mut context).await?;
        check_aborted(&context, "post persist")?;

        Ok(record_id)
    }

    /// Runs the steps up to and including the save, which also releases the lease.
    ///
    /// On error the lease is still held by `owner`.
    async fn prepare_and_save(
        &self,
        context: &mut PipelineContext,
        scope: &BatchScope,
        owner: &LeaseOwner,
    ) -> BulkResult<()> {
        self.pipelines.update_fields.run(context).await?;
        check_aborted(context, "update fields")?;

        self.pipelines.pre_persist.run(context).await?;
        check_aborted(context, "pre persist")?;

        #[cfg(feature = "failpoints")]
        bulk_fail_point(PROCESS_RECORD_BEFORE_SAVE_FP)?;

        if !self
            .repository
            .save_record(&context.record, owner, true, scope)
            .await?
        {
            bail!(
                ErrorKind::PersistFailed,
                "The destination record could not be saved",
                context.record.id
            );
        }

        Ok(())
    }
}

fn check_aborted(context: &PipelineContext, step: &str) -> BulkResult<()> {
    if let Some(reason) = context.abort_reason() {
        bail!(
            ErrorKind::PipelineAborted,
            "A record pipeline aborted",
            format!("{step}: {reason}")
        );
    }

    Ok(())
}
