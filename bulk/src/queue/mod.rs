//! Persistent, time-scheduled, multi-consumer work queue.

mod events;
mod item;
mod pool;

pub use events::{AddKind, AddedItem, QueueListener, RemovalReason};
pub use item::{Candidate, SchedulingOptions, WorkItem};
pub use pool::WorkQueue;
