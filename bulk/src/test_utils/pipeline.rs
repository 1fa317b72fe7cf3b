use std::collections::HashSet;

use crate::bail;
use crate::error::{BulkResult, ErrorKind};
use crate::orchestrator::{PipelineContext, RecordPipeline};

/// Copies every field of the source record onto the destination record.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyFieldsPipeline;

#[async_trait::async_trait]
impl RecordPipeline for CopyFieldsPipeline {
    async fn run(&self, context: &mut PipelineContext) -> BulkResult<()> {
        let fields = context.source.fields.clone();
        context.record.fields.extend(fields);

        Ok(())
    }
}

/// Aborts or fails the pipeline for chosen identifiers and passes every other record.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPipeline {
    abort_for: HashSet<String>,
    fail_for: HashSet<String>,
}

impl ScriptedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort_for(mut self, identifier: impl Into<String>) -> Self {
        self.abort_for.insert(identifier.into());
        self
    }

    pub fn fail_for(mut self, identifier: impl Into<String>) -> Self {
        self.fail_for.insert(identifier.into());
        self
    }
}

#[async_trait::async_trait]
impl RecordPipeline for ScriptedPipeline {
    async fn run(&self, context: &mut PipelineContext) -> BulkResult<()> {
        let identifier = &context.source.identifier;

        if self.fail_for.contains(identifier) {
            bail!(
                ErrorKind::RecordProcessingFailed,
                "Scripted pipeline failure",
                identifier.clone()
            );
        }

        if self.abort_for.contains(identifier) {
            context.abort(format!("scripted abort for {identifier}"));
        }

        Ok(())
    }
}
