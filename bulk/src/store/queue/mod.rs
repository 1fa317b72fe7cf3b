mod base;
mod memory;
mod postgres;

pub use base::{InsertOutcome, MergedItem, QueueStore};
pub use memory::MemoryQueueStore;
pub use postgres::PostgresQueueStore;
