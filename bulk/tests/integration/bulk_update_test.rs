use std::sync::Arc;

use bulk::error::ErrorKind;
use bulk::orchestrator::{
    JobStatus, LeaseOwner, Pipelines, Record, RecordResult, SourceRecord, SourceSet,
};
use bulk::service::BulkService;
use bulk::store::queue::MemoryQueueStore;
use bulk::store::tracker::OperationState;
use bulk::test_utils::config::test_bulk_config;
use bulk::test_utils::notifying_tracker::NotifyingTrackerStore;
use bulk::test_utils::pipeline::{CopyFieldsPipeline, ScriptedPipeline};
use bulk::test_utils::repository::MemoryRecordRepository;
use bulk::test_utils::scheduler::ManualJobScheduler;
use bulk::types::{ItemKey, RecordId};
use bulk_telemetry::tracing::init_test_tracing;

type TestService = BulkService<MemoryQueueStore, NotifyingTrackerStore, MemoryRecordRepository>;

fn create_service() -> (TestService, Arc<MemoryRecordRepository>, NotifyingTrackerStore) {
    let repository = Arc::new(MemoryRecordRepository::<MemoryQueueStore>::new());
    let tracker_store = NotifyingTrackerStore::new();

    let service = BulkService::new(
        test_bulk_config("contact_indexing", "contacts"),
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
            .map(|identifier| SourceRecord::new(*identifier).with_field("name", *identifier))
            .collect(),
    )
}

fn failure_kinds(results: &[RecordResult]) -> Vec<ErrorKind> {
    results
        .iter()
        .filter_map(|result| match result {
            RecordResult::Failure { cause, .. } => Some(cause.kind()),
            RecordResult::Success { .. } => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_completes_once_every_queued_item_is_checked_in() {
    init_test_tracing();
    let (service, repository, _) = create_service();
    let service = service.with_pipelines(Pipelines {
        update_fields: Arc::new(CopyFieldsPipeline),
        ..Pipelines::default()
    });

    let handle = service
        .submit_batch(source_set("march", &["a", "b", "c"]), "import")
        .unwrap();
    let job = handle.wait().await.unwrap();
    let operation_id = handle.operation_id();

    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(job.processed(), 3);
    assert!(job.results().iter().all(RecordResult::is_success));
    assert_eq!(
        repository.record("b").await.unwrap().fields["name"],
        serde_json::json!("b")
    );

    // The batch queued three items that are not consumed yet.
    assert_eq!(
        service.tracker().state(operation_id).await.unwrap(),
        Some(OperationState::InProgress {
            counter: -3,
            fixed: true
        })
    );

    let mut checked_out = Vec::new();
    for _ in 0..3 {
        let item = service.queue().try_checkout().await.unwrap().unwrap();
        assert!(item.is_tagged_with(operation_id));
        checked_out.push(item);
    }
    checked_out.sort_by(|a, b| a.key.cmp(&b.key));
    checked_out.dedup_by(|a, b| a.key == b.key);
    assert_eq!(checked_out.len(), 3);

    for item in &checked_out[..2] {
        assert!(service.queue().check_in(item).await.unwrap());
    }
    assert_eq!(
        service.tracker().state(operation_id).await.unwrap(),
        Some(OperationState::InProgress {
            counter: -1,
            fixed: true
        })
    );

    assert!(service.queue().check_in(&checked_out[2]).await.unwrap());
    assert!(
        service
            .tracker()
            .state(operation_id)
            .await
            .unwrap()
            .is_some_and(|state| state.is_complete())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_batch_completes_immediately() {
    init_test_tracing();
    let (service, _, tracker_store) = create_service();

    let handle = service.submit_batch(source_set("empty", &[]), "").unwrap();
    let operation_completed = tracker_store
        .notify_on_complete(handle.operation_id())
        .await;

    let job = handle.wait().await.unwrap();
    operation_completed.notified().await;

    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(job.processed(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn aborted_pipeline_fails_only_that_record() {
    init_test_tracing();
    let (service, repository, _) = create_service();
    let service = service.with_pipelines(Pipelines {
        pre_persist: Arc::new(ScriptedPipeline::new().abort_for("b")),
        ..Pipelines::default()
    });

    let handle = service
        .submit_batch(source_set("april", &["a", "b"]), "")
        .unwrap();
    let job = handle.wait().await.unwrap();
    let results = job.results();

    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(job.processed(), 2);
    assert_eq!(failure_kinds(&results), vec![ErrorKind::PipelineAborted]);
    assert!(repository.record("b").await.is_none());
    assert_eq!(repository.save_count().await, 1);

    // Only the saved record queued an item.
    assert_eq!(
        service.tracker().state(handle.operation_id()).await.unwrap(),
        Some(OperationState::InProgress {
            counter: -1,
            fixed: true
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_pipeline_releases_the_lease_of_a_loaded_record() {
    init_test_tracing();
    let (service, repository, _) = create_service();
    let service = service.with_pipelines(Pipelines {
        update_fields: Arc::new(ScriptedPipeline::new().fail_for("a")),
        ..Pipelines::default()
    });
    repository
        .insert_record(Record::new(RecordId::new(), "a"))
        .await;

    let handle = service.submit_batch(source_set("may", &["a"]), "").unwrap();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(
        failure_kinds(&job.results()),
        vec![ErrorKind::RecordProcessingFailed]
    );
    assert!(repository.lease_owner("a").await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_identifier_and_failed_save_are_recorded_per_record() {
    init_test_tracing();
    let (service, repository, _) = create_service();
    repository.fail_saves_for("c").await;

    let handle = service
        .submit_batch(source_set("june", &["a", "", "c"]), "")
        .unwrap();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(job.processed(), 3);
    assert_eq!(
        failure_kinds(&job.results()),
        vec![ErrorKind::MissingIdentifier, ErrorKind::PersistFailed]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn lease_held_by_another_owner_fails_the_job() {
    init_test_tracing();
    let (service, repository, _) = create_service();
    repository
        .insert_record(Record::new(RecordId::new(), "b"))
        .await;
    repository
        .hold_lease("b", LeaseOwner::new("other_worker", "other_job"))
        .await;

    let handle = service
        .submit_batch(source_set("july", &["a", "b", "c"]), "")
        .unwrap();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error().unwrap().kind(), ErrorKind::LeaseConflict);
    assert_eq!(job.processed(), 1);
    assert!(repository.record("c").await.is_none());

    // The batch still ended, so the tracker knows about the single queued item.
    assert_eq!(
        service.tracker().state(handle.operation_id()).await.unwrap(),
        Some(OperationState::InProgress {
            counter: -1,
            fixed: true
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn resubmitting_a_set_name_is_rejected() {
    init_test_tracing();
    let (service, _, _) = create_service();

    let handle = service.submit_batch(source_set("august", &["a"]), "").unwrap();
    handle.wait().await.unwrap();

    let err = service
        .submit_batch(source_set("august", &["b"]), "")
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::JobAlreadyExists);
    assert_eq!(service.runner().jobs().len(), 1);

    assert_eq!(service.prune_ended_jobs(), 1);
    let handle = service.submit_batch(source_set("august", &["b"]), "").unwrap();
    assert_eq!(handle.wait().await.unwrap().status(), JobStatus::Finished);
}

#[tokio::test(flavor = "multi_thread")]
async fn records_updated_twice_in_one_batch_queue_one_item() {
    init_test_tracing();
    let (service, repository, _) = create_service();
    let record = Record::new(RecordId::new(), "a");
    let key = ItemKey::from(record.id.as_uuid());
    repository.insert_record(record).await;

    let handle = service
        .submit_batch(source_set("september", &["a", "a"]), "")
        .unwrap();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.processed(), 2);
    let item = service.queue().get(&key).await.unwrap().unwrap();
    assert!(item.is_tagged_with(handle.operation_id()));
    assert_eq!(
        service.tracker().state(handle.operation_id()).await.unwrap(),
        Some(OperationState::InProgress {
            counter: -1,
            fixed: true
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_save_of_a_leased_record_does_not_block_later_batches() {
    init_test_tracing();
    let (service, repository, _) = create_service();
    repository
        .insert_record(Record::new(RecordId::new(), "a"))
        .await;
    repository.fail_saves_for("a").await;

    let first = service.submit_batch(source_set("october", &["a"]), "").unwrap();
    let job = first.wait().await.unwrap();

    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(failure_kinds(&job.results()), vec![ErrorKind::PersistFailed]);
    assert!(repository.lease_owner("a").await.is_none());

    let second = service
        .submit_batch(source_set("november", &["a"]), "")
        .unwrap();
    let job = second.wait().await.unwrap();

    assert_eq!(job.status(), JobStatus::Finished);
    assert!(job.error().is_none());
    assert_eq!(failure_kinds(&job.results()), vec![ErrorKind::PersistFailed]);
}
