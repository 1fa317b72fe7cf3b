use std::collections::BTreeSet;
use std::sync::Arc;

use bulk::agent::ResourceReleaseAgent;
use bulk::orchestrator::{BulkJob, BulkJobRunner};
use bulk::store::tracker::MemoryTrackerStore;
use bulk::test_utils::registry::MemoryResourceRegistry;
use bulk::tracker::CompletionTracker;
use bulk::types::OperationId;
use bulk_telemetry::tracing::init_test_tracing;

struct Fixture {
    registry: MemoryResourceRegistry,
    tracker: CompletionTracker<MemoryTrackerStore>,
    runner: Arc<BulkJobRunner>,
    agent: ResourceReleaseAgent<MemoryTrackerStore>,
}

fn create_fixture() -> Fixture {
    let registry = MemoryResourceRegistry::new();
    let tracker = CompletionTracker::new(MemoryTrackerStore::new());
    let runner = Arc::new(BulkJobRunner::new());
    let agent = ResourceReleaseAgent::new(
        Arc::new(registry.clone()),
        tracker.clone(),
        runner.clone(),
    );

    Fixture {
        registry,
        tracker,
        runner,
        agent,
    }
}

/// Registers an operation and completes it without queued items.
async fn complete_operation(tracker: &CompletionTracker<MemoryTrackerStore>) -> OperationId {
    let operation_id = OperationId::new();
    tracker.lock(operation_id).await.unwrap();
    tracker.unlock(operation_id, 0).await.unwrap();

    operation_id
}

#[tokio::test]
async fn resource_is_unlocked_once_every_operation_is_released() {
    init_test_tracing();
    let fixture = create_fixture();

    let released = OperationId::new();
    let pending = complete_operation(&fixture.tracker).await;
    fixture
        .registry
        .lock_resource("list-1", [released, pending])
        .await;

    // One operation is still registered: the released one is detached, the resource stays locked.
    assert_eq!(fixture.agent.run_once().await.unwrap(), 0);
    assert!(fixture.registry.is_locked("list-1").await);
    assert_eq!(
        fixture.registry.attached_operations("list-1").await,
        BTreeSet::from([pending])
    );

    assert!(fixture.tracker.release(pending).await.unwrap());

    assert_eq!(fixture.agent.run_once().await.unwrap(), 1);
    assert!(!fixture.registry.is_locked("list-1").await);
    assert!(fixture.registry.attached_operations("list-1").await.is_empty());
    assert_eq!(fixture.registry.refresh_count("list-1").await, 1);
}

#[tokio::test]
async fn resource_with_a_processing_operation_is_skipped() {
    init_test_tracing();
    let fixture = create_fixture();

    let operation_id = OperationId::new();
    fixture
        .runner
        .start(
            Arc::new(BulkJob::new("bulk_update:pending", operation_id)),
            std::future::pending::<()>(),
        )
        .unwrap();
    fixture
        .registry
        .lock_resource("list-1", [operation_id])
        .await;

    assert_eq!(fixture.agent.run_once().await.unwrap(), 0);
    assert!(fixture.registry.is_locked("list-1").await);
    assert_eq!(
        fixture.registry.attached_operations("list-1").await,
        BTreeSet::from([operation_id])
    );
}

#[tokio::test]
async fn resource_without_operations_is_left_alone() {
    init_test_tracing();
    let fixture = create_fixture();
    fixture.registry.lock_resource("list-1", []).await;

    assert_eq!(fixture.agent.run_once().await.unwrap(), 0);
    assert!(fixture.registry.is_locked("list-1").await);
}

#[tokio::test]
async fn unavailable_lock_keeps_the_resource_locked() {
    init_test_tracing();
    let fixture = create_fixture();
    fixture
        .registry
        .lock_resource("list-1", [OperationId::new()])
        .await;
    fixture.registry.set_lock_available("list-1", false).await;

    assert_eq!(fixture.agent.run_once().await.unwrap(), 0);
    assert!(fixture.registry.is_locked("list-1").await);

    fixture.registry.set_lock_available("list-1", true).await;

    assert_eq!(fixture.agent.run_once().await.unwrap(), 1);
    assert!(!fixture.registry.is_locked("list-1").await);
}

#[tokio::test]
async fn disabled_agent_does_nothing() {
    init_test_tracing();
    let fixture = create_fixture();
    fixture
        .registry
        .lock_resource("list-1", [OperationId::new()])
        .await;

    fixture.agent.set_disabled(true);

    assert_eq!(fixture.agent.run_once().await.unwrap(), 0);
    assert!(fixture.registry.is_locked("list-1").await);
}
