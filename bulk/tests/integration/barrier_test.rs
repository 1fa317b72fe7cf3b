use std::sync::Arc;
use std::time::Duration;

use bulk::barrier::ConsistencyBarrierCoordinator;
use bulk::concurrency::shutdown::create_shutdown_channel;
use bulk::index::{IndexCycleObserver, index_job_name};
use bulk::test_utils::notifying_tracker::NotifyingTrackerStore;
use bulk::test_utils::scheduler::ManualJobScheduler;
use bulk::tracker::CompletionTracker;
use bulk::types::OperationId;
use bulk::workers::OperationReleaseWorker;
use bulk_config::shared::IndexObserverConfig;
use bulk_telemetry::tracing::init_test_tracing;
use chrono::Utc;
use tokio::time::sleep;

struct Fixture {
    tracker_store: NotifyingTrackerStore,
    scheduler: Arc<ManualJobScheduler>,
    coordinator: Arc<ConsistencyBarrierCoordinator<NotifyingTrackerStore>>,
}

fn create_fixture() -> Fixture {
    let tracker_store = NotifyingTrackerStore::new();
    let scheduler = Arc::new(ManualJobScheduler::new());
    let observer = Arc::new(IndexCycleObserver::new(
        &IndexObserverConfig {
            index_name: "contacts".to_string(),
        },
        scheduler.clone(),
    ));
    let coordinator = Arc::new(ConsistencyBarrierCoordinator::new(
        "contact_indexing".to_string(),
        CompletionTracker::new(tracker_store.clone()),
        observer,
    ));

    Fixture {
        tracker_store,
        scheduler,
        coordinator,
    }
}

/// Registers an operation and completes it right away, as a batch without queued items does.
async fn complete_operation(tracker: &CompletionTracker<NotifyingTrackerStore>) -> OperationId {
    let operation_id = OperationId::new();
    assert!(tracker.lock(operation_id).await.unwrap());
    assert!(tracker.unlock(operation_id, 0).await.unwrap());

    operation_id
}

#[tokio::test(flavor = "multi_thread")]
async fn only_operations_completed_before_the_cycle_start_are_released() {
    init_test_tracing();
    let fixture = create_fixture();
    let tracker = fixture.coordinator.tracker();
    let observer = fixture.coordinator.observer();
    let job_name = index_job_name("contacts");

    let before_cycle = complete_operation(tracker).await;
    sleep(Duration::from_millis(5)).await;

    observer.job_started(&job_name);
    sleep(Duration::from_millis(5)).await;

    let during_cycle = complete_operation(tracker).await;
    let event = observer.job_finished(&job_name).unwrap();

    let released = fixture.coordinator.on_cycle_finished(&event).await.unwrap();

    assert_eq!(released, 1);
    assert!(!tracker.is_registered(before_cycle).await.unwrap());
    assert!(tracker.is_registered(during_cycle).await.unwrap());

    // The next cycle covers the operation that completed during the previous one.
    observer.job_started(&job_name);
    let event = observer.job_finished(&job_name).unwrap();
    let released = fixture.coordinator.on_cycle_finished(&event).await.unwrap();

    assert_eq!(released, 1);
    assert!(!tracker.is_registered(during_cycle).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn cycle_started_before_the_observer_releases_nothing() {
    init_test_tracing();
    let fixture = create_fixture();
    let tracker = fixture.coordinator.tracker();

    let operation_id = complete_operation(tracker).await;
    let event = fixture
        .coordinator
        .observer()
        .job_finished("INDEX_UPDATE:contacts")
        .unwrap();

    assert!(event.window.started_at.is_none());
    assert_eq!(
        fixture.coordinator.on_cycle_finished(&event).await.unwrap(),
        0
    );
    assert!(tracker.is_registered(operation_id).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn in_progress_operations_are_never_released() {
    init_test_tracing();
    let fixture = create_fixture();
    let tracker = fixture.coordinator.tracker();

    let operation_id = OperationId::new();
    tracker.lock(operation_id).await.unwrap();
    tracker.unlock(operation_id, 2).await.unwrap();

    let released = fixture
        .coordinator
        .release_completed_before(Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(released, 0);
    assert!(tracker.is_registered(operation_id).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn release_worker_releases_after_each_cycle() {
    init_test_tracing();
    let fixture = create_fixture();
    let tracker = fixture.coordinator.tracker();
    let observer = fixture.coordinator.observer().clone();
    let job_name = index_job_name("contacts");

    // A cycle is queued, so the startup cleanup must leave everything in place.
    fixture.scheduler.set_queued(&job_name, true);
    let operation_id = complete_operation(tracker).await;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let worker = OperationReleaseWorker::new(fixture.coordinator.clone(), Utc::now(), shutdown_rx)
        .start();

    let released = fixture.tracker_store.notify_on_released(operation_id).await;

    // Lets the worker subscribe before the cycle runs.
    sleep(Duration::from_millis(20)).await;
    fixture.scheduler.set_queued(&job_name, false);
    fixture.scheduler.set_running(&job_name, true);
    observer.job_started(&job_name);
    fixture.scheduler.set_running(&job_name, false);
    observer.job_finished(&job_name);

    released.notified().await;

    shutdown_tx.shutdown();
    worker.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn startup_cleanup_releases_operations_completed_before_start() {
    init_test_tracing();
    let fixture = create_fixture();
    let tracker = fixture.coordinator.tracker();

    let stale = complete_operation(tracker).await;
    sleep(Duration::from_millis(5)).await;
    let process_started_at = Utc::now();
    sleep(Duration::from_millis(5)).await;
    let fresh = complete_operation(tracker).await;

    let released = fixture
        .coordinator
        .startup_cleanup(process_started_at)
        .await
        .unwrap();

    assert_eq!(released, 1);
    assert!(!tracker.is_registered(stale).await.unwrap());
    assert!(tracker.is_registered(fresh).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn startup_cleanup_defers_to_a_running_cycle() {
    init_test_tracing();
    let fixture = create_fixture();
    let tracker = fixture.coordinator.tracker();

    let operation_id = complete_operation(tracker).await;
    fixture
        .scheduler
        .set_running(&index_job_name("contacts"), true);

    let released = fixture
        .coordinator
        .startup_cleanup(Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(released, 0);
    assert!(tracker.is_registered(operation_id).await.unwrap());
}
