use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::{ItemKey, OperationId};

/// One queued unit of downstream work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub key: ItemKey,
    /// Earliest time the item can be checked out.
    pub scheduled: DateTime<Utc>,
    /// Number of checkouts so far.
    pub attempts: u32,
    pub properties: BTreeMap<String, String>,
    /// Operations this item belongs to; `None` for items produced outside any batch.
    pub operation_ids: Option<BTreeSet<OperationId>>,
}

impl WorkItem {
    pub fn new(key: impl Into<ItemKey>) -> Self {
        Self {
            key: key.into(),
            scheduled: Utc::now(),
            attempts: 0,
            properties: BTreeMap::new(),
            operation_ids: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Associates the item with `operation_id`. Returns `false` if it already was.
    pub fn tag_operation(&mut self, operation_id: OperationId) -> bool {
        self.operation_ids
            .get_or_insert_with(BTreeSet::new)
            .insert(operation_id)
    }

    pub fn is_tagged_with(&self, operation_id: OperationId) -> bool {
        self.operation_ids
            .as_ref()
            .is_some_and(|ids| ids.contains(&operation_id))
    }

    /// Iterates the associated operation ids, if any.
    pub fn operation_ids(&self) -> impl Iterator<Item = OperationId> + '_ {
        self.operation_ids.iter().flatten().copied()
    }
}

/// Options applied when an item is added.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulingOptions {
    /// Delay from now before the item becomes due.
    pub delay: Duration,
}

impl SchedulingOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Key and schedule of a due item, as read when building the checkout pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: ItemKey,
    pub scheduled: DateTime<Utc>,
}
