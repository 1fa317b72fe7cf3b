//! Consistency barrier for bulk record updates against an asynchronously rebuilt index.
//!
//! A bulk batch registers an operation in the [`tracker::CompletionTracker`], tags every
//! [`queue::WorkItem`] it produces with the operation id and reports how many it queued when
//! it finishes. Queue consumers count the items back in. Once the count is balanced the
//! operation is complete, and it is released after an index rebuild that started later has
//! finished, as reported by the [`index::IndexCycleObserver`]. The
//! [`barrier::ConsistencyBarrierCoordinator`] wires these pieces together and
//! [`orchestrator::BulkUpdateManager`] drives the batches.

pub mod agent;
pub mod barrier;
pub mod concurrency;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod index;
mod macros;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod scope;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tracker;
pub mod types;
pub mod workers;
