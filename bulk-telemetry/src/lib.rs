//! Tracing and metrics initialization shared by every binary and test in the workspace.

pub mod metrics;
pub mod tracing;
