//! Unlocking of resources whose bulk operations have all been released.

mod release;

pub use release::{LockedResource, LockedResourceRegistry, ResourceLock, ResourceReleaseAgent};
