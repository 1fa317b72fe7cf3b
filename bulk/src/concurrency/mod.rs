//! Coordination primitives shared by the background workers.

pub mod shutdown;
