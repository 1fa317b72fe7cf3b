//! Consistency barrier between bulk batches, queue consumption and index cycles.

mod coordinator;

pub use coordinator::ConsistencyBarrierCoordinator;
