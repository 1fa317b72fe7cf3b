use std::sync::Arc;

use crate::error::BulkResult;
use crate::orchestrator::{Record, SourceRecord};

/// State shared by the steps of one record's pipeline.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub record: Record,
    pub source: SourceRecord,
    pub context_data: String,
    aborted: Option<String>,
}

impl PipelineContext {
    pub fn new(record: Record, source: SourceRecord, context_data: impl Into<String>) -> Self {
        Self {
            record,
            source,
            context_data: context_data.into(),
            aborted: None,
        }
    }

    /// Stops the record from being persisted. Later steps see the context as aborted.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.aborted = Some(reason.into());
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.aborted.as_deref()
    }
}

/// One step applied to every record of a bulk job.
///
/// A step either mutates the context's record, aborts the context, or fails with an error.
#[async_trait::async_trait]
pub trait RecordPipeline: Send + Sync {
    async fn run(&self, context: &mut PipelineContext) -> BulkResult<()>;
}

/// Step that leaves the record untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPipeline;

#[async_trait::async_trait]
impl RecordPipeline for NoopPipeline {
    async fn run(&self, _context: &mut PipelineContext) -> BulkResult<()> {
        Ok(())
    }
}

/// The three steps around persisting a record.
#[derive(Clone)]
pub struct Pipelines {
    /// Copies incoming fields onto the destination record.
    pub update_fields: Arc<dyn RecordPipeline>,
    /// Validates or transforms the record before it is saved.
    pub pre_persist: Arc<dyn RecordPipeline>,
    /// Runs after a successful save.
    pub post_persist: Arc<dyn RecordPipeline>,
}

impl Default for Pipelines {
    fn default() -> Self {
        Self {
            update_fields: Arc::new(NoopPipeline),
            pre_persist: Arc::new(NoopPipeline),
            post_persist: Arc::new(NoopPipeline),
        }
    }
}
