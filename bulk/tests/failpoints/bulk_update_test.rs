use std::sync::Arc;

use bulk::concurrency::shutdown::create_shutdown_channel;
use bulk::error::ErrorKind;
use bulk::failpoints::{
    BATCH_BEFORE_FINISHED_FP, PROCESS_RECORD_BEFORE_SAVE_FP, QUEUE_CHECK_IN_FP,
};
use bulk::orchestrator::{JobStatus, Record, RecordResult, SourceRecord, SourceSet};
use bulk::service::BulkService;
use bulk::store::queue::MemoryQueueStore;
use bulk::store::tracker::OperationState;
use bulk::test_utils::config::test_bulk_config;
use bulk::test_utils::failpoints::FailPointGuard;
use bulk::test_utils::handler::RecordingHandler;
use bulk::test_utils::notifying_tracker::NotifyingTrackerStore;
use bulk::test_utils::repository::MemoryRecordRepository;
use bulk::test_utils::scheduler::ManualJobScheduler;
use bulk::types::RecordId;
use bulk_telemetry::tracing::init_test_tracing;

type TestService = BulkService<MemoryQueueStore, NotifyingTrackerStore, MemoryRecordRepository>;

fn create_service() -> (TestService, Arc<MemoryRecordRepository>, NotifyingTrackerStore) {
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

    (service, repository, tracker_store)
}

fn source_set(name: &str, identifiers: &[&str]) -> SourceSet {
    SourceSet::new(
        name,
        identifiers
            .iter()
            .map(|identifier| SourceRecord::new(*identifier))
            .collect(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn store_error_before_save_fails_only_that_record() {
    init_test_tracing();
    let _scenario = FailPointGuard::activate(&[(PROCESS_RECORD_BEFORE_SAVE_FP, "1*return(store)")]);
    let (service, repository, _) = create_service();

    let handle = service
        .submit_batch(source_set("march", &["a", "b"]), "")
        .unwrap();
    let job = handle.wait().await.unwrap();
    let results = job.results();

    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(job.processed(), 2);
    match &results[0] {
        RecordResult::Failure { cause, source } => {
            assert_eq!(cause.kind(), ErrorKind::StoreQueryFailed);
            assert_eq!(source.identifier, "a");
        }
        RecordResult::Success { .. } => panic!("the first record was expected to fail"),
    }
    assert!(results[1].is_success());
    assert_eq!(repository.save_count().await, 1);
    assert_eq!(
        service.tracker().state(handle.operation_id()).await.unwrap(),
        Some(OperationState::InProgress {
            counter: -1,
            fixed: true
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_while_finishing_the_batch_fails_the_job_after_unlocking() {
    init_test_tracing();
    let _scenario = FailPointGuard::activate(&[(BATCH_BEFORE_FINISHED_FP, "return")]);
    let (service, _, _) = create_service();

    let handle = service.submit_batch(source_set("april", &["a"]), "").unwrap();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error().unwrap().kind(), ErrorKind::FailpointTriggered);

    // Listeners were still told that the batch finished.
    assert_eq!(
        service.tracker().state(handle.operation_id()).await.unwrap(),
        Some(OperationState::InProgress {
            counter: -1,
            fixed: true
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_check_in_leaves_the_item_for_retry() {
    init_test_tracing();
    let _scenario = FailPointGuard::activate(&[(QUEUE_CHECK_IN_FP, "1*return(store)")]);
    let (service, _, tracker_store) = create_service();

    let handle = service.submit_batch(source_set("may", &["a"]), "").unwrap();
    handle.wait().await.unwrap();

    let operation_completed = tracker_store
        .notify_on_complete(handle.operation_id())
        .await;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let handler = Arc::new(RecordingHandler::new());
    let workers = service.start_consumers(handler.clone(), 1, &shutdown_rx);

    // The first check in fails, so the item is handled a second time before it completes.
    let handled_twice = handler.notify_on_handled(2).await;
    handled_twice.notified().await;
    operation_completed.notified().await;

    shutdown_tx.shutdown();
    for worker in workers {
        worker.wait().await.unwrap();
    }

    let handled = handler.handled().await;
    assert_eq!(handled.len(), 2);
    assert_eq!(handled[0], handled[1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn store_error_before_save_releases_the_lease() {
    init_test_tracing();
    let _scenario = FailPointGuard::activate(&[(PROCESS_RECORD_BEFORE_SAVE_FP, "1*return(store)")]);
    let (service, repository, _) = create_service();
    repository
        .insert_record(Record::new(RecordId::new(), "a"))
        .await;

    let handle = service.submit_batch(source_set("june", &["a"]), "").unwrap();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status(), JobStatus::Finished);
    assert!(!job.results()[0].is_success());
    assert!(repository.lease_owner("a").await.is_none());

    // The fail point fired once, so the next batch saves the record.
    let handle = service.submit_batch(source_set("july", &["a"]), "").unwrap();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status(), JobStatus::Finished);
    assert!(job.results()[0].is_success());
}
