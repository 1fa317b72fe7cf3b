//! Per-batch context threaded explicitly through the enqueue path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::OperationId;

/// Handle to one in-flight batch.
///
/// Created when a batch starts and passed down to every call that may enqueue work on its
/// behalf. Items added with a scope are tagged with its operation id and counted, so the
/// number of items queued by the batch is known when it finishes. Clones share the count.
#[derive(Debug, Clone)]
pub struct BatchScope {
    operation_id: OperationId,
    queued: Arc<AtomicUsize>,
}

impl BatchScope {
    pub fn new(operation_id: OperationId) -> Self {
        Self {
            operation_id,
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Records one item queued for this batch and returns the new total.
    pub fn record_queued(&self) -> usize {
        self.queued.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_queued_count() {
        let scope = BatchScope::new(OperationId::new());
        let clone = scope.clone();

        scope.record_queued();
        clone.record_queued();

        assert_eq!(scope.queued_count(), 2);
        assert_eq!(clone.operation_id(), scope.operation_id());
    }

    #[test]
    fn scopes_of_different_batches_are_independent() {
        let first = BatchScope::new(OperationId::new());
        let second = BatchScope::new(OperationId::new());

        first.record_queued();

        assert_eq!(first.queued_count(), 1);
        assert_eq!(second.queued_count(), 0);
    }
}
