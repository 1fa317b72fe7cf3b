mod base;
mod memory;
mod postgres;

pub use base::{OperationState, TrackerStore, VersionedOperation};
pub use memory::MemoryTrackerStore;
pub use postgres::PostgresTrackerStore;
