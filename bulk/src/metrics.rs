//! Metric names and labels emitted by the crate.

/// Label carrying the queue pool name.
pub const POOL_NAME_LABEL: &str = "pool_name";

/// Label carrying the reason an item left the queue.
pub const REMOVAL_REASON_LABEL: &str = "reason";

/// Label carrying the outcome of a processed record.
pub const OUTCOME_LABEL: &str = "outcome";

// Queue metrics

/// Counter of items newly inserted into a queue.
pub const BULK_QUEUE_ITEMS_ADDED_TOTAL: &str = "bulk_queue_items_added_total";

/// Counter of adds merged into an existing item.
pub const BULK_QUEUE_ITEMS_MERGED_TOTAL: &str = "bulk_queue_items_merged_total";

/// Counter of adds rejected because the key already existed.
pub const BULK_QUEUE_ITEMS_REJECTED_TOTAL: &str = "bulk_queue_items_rejected_total";

/// Counter of `try_checkout` invocations, successful or not.
pub const BULK_QUEUE_CHECKOUT_CALLS_TOTAL: &str = "bulk_queue_checkout_calls_total";

/// Counter of items handed out by `try_checkout`.
pub const BULK_QUEUE_CHECKOUTS_TOTAL: &str = "bulk_queue_checkouts_total";

/// Counter of items removed from a queue, labelled by reason.
pub const BULK_QUEUE_ITEMS_REMOVED_TOTAL: &str = "bulk_queue_items_removed_total";

/// Counter of `cancel_all` invocations.
pub const BULK_QUEUE_CLEARS_TOTAL: &str = "bulk_queue_clears_total";

// Tracker metrics

/// Counter of operations that reached the complete state.
pub const BULK_OPERATIONS_COMPLETED_TOTAL: &str = "bulk_operations_completed_total";

/// Counter of complete operations released.
pub const BULK_OPERATIONS_RELEASED_TOTAL: &str = "bulk_operations_released_total";

/// Counter of tracker anomalies such as counter overshoot.
pub const BULK_OPERATION_ANOMALIES_TOTAL: &str = "bulk_operation_anomalies_total";

// Orchestrator metrics

/// Counter of records processed by bulk jobs, labelled by outcome.
pub const BULK_RECORDS_PROCESSED_TOTAL: &str = "bulk_records_processed_total";

/// Counter of resources unlocked by the release agent.
pub const BULK_RESOURCES_UNLOCKED_TOTAL: &str = "bulk_resources_unlocked_total";
