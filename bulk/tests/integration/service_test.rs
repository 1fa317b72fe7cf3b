use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bulk::concurrency::shutdown::create_shutdown_channel;
use bulk::error::ErrorKind;
use bulk::index::index_job_name;
use bulk::orchestrator::{JobStatus, SourceRecord, SourceSet};
use bulk::service::BulkService;
use bulk::store::queue::MemoryQueueStore;
use bulk::test_utils::config::test_bulk_config;
use bulk::test_utils::handler::RecordingHandler;
use bulk::test_utils::notifying_tracker::NotifyingTrackerStore;
use bulk::test_utils::registry::MemoryResourceRegistry;
use bulk::test_utils::repository::MemoryRecordRepository;
use bulk::test_utils::scheduler::ManualJobScheduler;
use bulk::types::ItemKey;
use bulk_config::{Environment, load_bulk_config_from};
use bulk_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn bulk_update_is_consistent_after_consumption_and_index_cycle() {
    init_test_tracing();
    let repository = Arc::new(MemoryRecordRepository::<MemoryQueueStore>::new());
    let tracker_store = NotifyingTrackerStore::new();
    let registry = MemoryResourceRegistry::new();

    let service = BulkService::new(
        test_bulk_config("contact_indexing", "contacts"),
        MemoryQueueStore::new(),
        tracker_store.clone(),
        repository.clone(),
        Arc::new(ManualJobScheduler::new()),
    )
    .unwrap();
    repository.attach_queue(service.queue().clone());

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let handler = Arc::new(RecordingHandler::new());
    let mut workers = service.start_consumers(handler.clone(), 2, &shutdown_rx);
    workers.push(service.start_release_worker(&shutdown_rx));
    workers.extend(service.start_release_agent(Arc::new(registry.clone()), &shutdown_rx));

    let records = (0..5)
        .map(|i| SourceRecord::new(format!("contact-{i}")))
        .collect();
    let handle = service
        .submit_batch(SourceSet::new("october", records), "")
        .unwrap();
    registry
        .lock_resource("list-1", [handle.operation_id()])
        .await;

    let operation_completed = tracker_store
        .notify_on_complete(handle.operation_id())
        .await;
    let operation_released = tracker_store
        .notify_on_released(handle.operation_id())
        .await;

    let job = handle.wait().await.unwrap();
    assert_eq!(job.status(), JobStatus::Finished);

    operation_completed.notified().await;
    let handled: BTreeSet<_> = handler.handled().await.into_iter().collect();
    assert_eq!(handled.len(), 5);

    // A full index cycle after completion releases the operation.
    let job_name = index_job_name("contacts");
    service.observer().job_started(&job_name);
    service.observer().job_finished(&job_name);
    operation_released.notified().await;

    // The agent unlocks the resource on one of its next passes.
    tokio::time::timeout(Duration::from_secs(10), async {
        while registry.is_locked("list-1").await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown_tx.shutdown();
    for worker in workers {
        worker.wait().await.unwrap();
    }

    assert!(!service.tracker().is_registered(handle.operation_id()).await.unwrap());
    assert!(service.queue().try_checkout().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_items_are_retried_until_handled() {
    init_test_tracing();
    let repository = Arc::new(MemoryRecordRepository::<MemoryQueueStore>::new());
    let tracker_store = NotifyingTrackerStore::new();

    let mut config = test_bulk_config("contact_indexing", "contacts");
    config.queue.retry_attempts = 100;

    let service = BulkService::new(
        config,
        MemoryQueueStore::new(),
        tracker_store.clone(),
        repository.clone(),
        Arc::new(ManualJobScheduler::new()),
    )
    .unwrap();
    repository.attach_queue(service.queue().clone());

    let handle = service
        .submit_batch(SourceSet::new("november", vec![SourceRecord::new("a")]), "")
        .unwrap();
    handle.wait().await.unwrap();

    let record = repository.record("a").await.unwrap();
    let key = ItemKey::from(record.id.as_uuid());
    let handler = Arc::new(RecordingHandler::new());
    handler.fail_for(key.clone()).await;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let workers = service.start_consumers(handler.clone(), 1, &shutdown_rx);

    let operation_completed = tracker_store
        .notify_on_complete(handle.operation_id())
        .await;
    let handled = handler.notify_on_handled(1).await;

    // Give the consumer a chance to fail on the item before it may succeed.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(handler.handled().await.is_empty());
    handler.recover(&key).await;

    handled.notified().await;
    operation_completed.notified().await;

    let stored = service.queue().get(&key).await.unwrap();
    assert!(stored.is_none());

    shutdown_tx.shutdown();
    for worker in workers {
        worker.wait().await.unwrap();
    }
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    init_test_tracing();
    let mut config = test_bulk_config("contact_indexing", "contacts");
    config.observer.index_name = String::new();

    let result = BulkService::new(
        config,
        MemoryQueueStore::new(),
        NotifyingTrackerStore::new(),
        Arc::new(MemoryRecordRepository::<MemoryQueueStore>::new()),
        Arc::new(ManualJobScheduler::new()),
    );

    assert_eq!(result.err().unwrap().kind(), ErrorKind::ConfigError);
}

#[tokio::test]
async fn service_starts_from_a_configuration_directory() {
    init_test_tracing();
    let directory = std::env::temp_dir().join(format!("bulk-service-config-{}", std::process::id()));
    std::fs::create_dir_all(&directory).unwrap();
    std::fs::write(
        directory.join("base.yaml"),
        "queue:\n  pool_name: contact_indexing\nobserver:\n  index_name: contacts\n",
    )
    .unwrap();
    std::fs::write(
        directory.join("prod.yaml"),
        "queue:\n  pool_name: contact_indexing_prod\n",
    )
    .unwrap();

    let config = load_bulk_config_from(&directory, Environment::Prod).unwrap();
    std::fs::remove_dir_all(&directory).unwrap();

    let service = BulkService::new(
        config,
        MemoryQueueStore::new(),
        NotifyingTrackerStore::new(),
        Arc::new(MemoryRecordRepository::<MemoryQueueStore>::new()),
        Arc::new(ManualJobScheduler::new()),
    )
    .unwrap();
    assert_eq!(service.queue().pool_name(), "contact_indexing_prod");
}

#[test]
fn missing_configuration_directory_is_a_config_error() {
    let directory = std::env::temp_dir().join("bulk-service-config-absent");

    let err: bulk::error::BulkError = load_bulk_config_from(&directory, Environment::Dev)
        .unwrap_err()
        .into();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}
