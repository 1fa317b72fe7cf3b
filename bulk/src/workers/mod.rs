//! Background workers: queue consumers, operation release and resource unlocking.

mod agent;
mod base;
mod consumer;
mod release;

pub use agent::ReleaseAgentWorker;
pub use base::WorkerHandle;
pub use consumer::{QueueConsumer, WorkItemHandler};
pub use release::OperationReleaseWorker;
