//! Bulk update jobs: load-or-create, pipeline, persist and batch lifecycle signalling.

mod events;
mod job;
mod manager;
mod pipeline;
mod record;
mod repository;
mod runner;

pub use events::BatchListener;
pub use job::{BulkJob, JobStatus, RecordResult};
pub use manager::{BulkUpdateManager, OperationHandle};
pub use pipeline::{NoopPipeline, PipelineContext, Pipelines, RecordPipeline};
pub use record::{Record, SourceRecord, SourceSet};
pub use repository::{LeaseOwner, LoadOutcome, RecordRepository};
pub use runner::{BulkJobRunner, OperationStatus};
