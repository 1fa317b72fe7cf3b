//! Test doubles for the collaborators of the bulk update core.
//!
//! Everything here is in memory. Waiting helpers return [`notify::TimedNotify`] so that a
//! condition that is never reached fails the test instead of hanging it.

pub mod config;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod handler;
pub mod notify;
pub mod notifying_tracker;
pub mod pipeline;
pub mod registry;
pub mod repository;
pub mod scheduler;
