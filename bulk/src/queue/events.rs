use std::collections::BTreeSet;
use std::fmt;

use crate::error::BulkResult;
use crate::queue::WorkItem;
use crate::scope::BatchScope;
use crate::types::OperationId;

/// Why an item left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The consumer checked the item in after processing it.
    CheckedIn,
    /// The item was checked out more often than the retry limit allows.
    MaxAttemptsReached,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::CheckedIn => "checked_in",
            RemovalReason::MaxAttemptsReached => "max_attempts_reached",
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an add reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddKind {
    Inserted,
    /// Merged into an existing item that carried `previous_operation_ids` before.
    Merged {
        previous_operation_ids: BTreeSet<OperationId>,
    },
}

/// Outcome of a successful add, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedItem {
    pub item: WorkItem,
    pub kind: AddKind,
}

impl AddedItem {
    /// Returns `true` if this add is what associated the item with `operation_id`.
    ///
    /// A merge into an item that was already tagged with the operation does not count,
    /// since the item is still checked in only once.
    pub fn newly_tagged(&self, operation_id: OperationId) -> bool {
        if !self.item.is_tagged_with(operation_id) {
            return false;
        }

        match &self.kind {
            AddKind::Inserted => true,
            AddKind::Merged {
                previous_operation_ids,
            } => !previous_operation_ids.contains(&operation_id),
        }
    }
}

/// Observer of a queue's item lifecycle.
///
/// Every callback receives the name of the pool that raised it; listeners shared by
/// several queues are expected to filter on it. Errors returned by a listener abort the
/// queue operation that raised the event.
#[async_trait::async_trait]
pub trait QueueListener: Send + Sync {
    /// Called before an item is persisted; the listener may modify it.
    async fn on_adding(
        &self,
        _pool_name: &str,
        _item: &mut WorkItem,
        _scope: Option<&BatchScope>,
    ) -> BulkResult<()> {
        Ok(())
    }

    /// Called after an item has been inserted or merged.
    async fn on_added(
        &self,
        _pool_name: &str,
        _added: &AddedItem,
        _scope: Option<&BatchScope>,
    ) -> BulkResult<()> {
        Ok(())
    }

    /// Called after an item has been deleted, with the item as it was stored.
    async fn on_removed(
        &self,
        _pool_name: &str,
        _item: &WorkItem,
        _reason: RemovalReason,
    ) -> BulkResult<()> {
        Ok(())
    }

    /// Called after every item of the queue has been deleted.
    async fn on_cleared(&self, _pool_name: &str) -> BulkResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_into_already_tagged_item_is_not_newly_tagged() {
        let operation_id = OperationId::new();
        let mut item = WorkItem::new("contact-1");
        item.tag_operation(operation_id);

        let inserted = AddedItem {
            item: item.clone(),
            kind: AddKind::Inserted,
        };
        let merged_again = AddedItem {
            item: item.clone(),
            kind: AddKind::Merged {
                previous_operation_ids: BTreeSet::from([operation_id]),
            },
        };
        let merged_first_time = AddedItem {
            item,
            kind: AddKind::Merged {
                previous_operation_ids: BTreeSet::new(),
            },
        };

        assert!(inserted.newly_tagged(operation_id));
        assert!(!merged_again.newly_tagged(operation_id));
        assert!(merged_first_time.newly_tagged(operation_id));
        assert!(!inserted.newly_tagged(OperationId::new()));
    }
}
