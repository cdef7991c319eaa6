//! End-to-end pipeline tests against in-memory backends.
//!
//! These drive the scan worker the way the event queue does in production:
//! intake writes the raw object and the initial status record, then an
//! object-created event is handed to the worker, possibly more than once.

use std::sync::Arc;
use uuid::Uuid;
use veriscan_core::{sha256_hex, EventType, FileRecord, ObjectCreatedEvent, ScanStatus};
use veriscan_db::{MemoryStatusStore, StatusStore};
use veriscan_services::stub::{ENGINE_ERROR_MARKER, INFECTED_MARKER};
use veriscan_services::StubScanner;
use veriscan_storage::{clean_object_key, raw_object_key, MemoryObjectStore, ObjectStore};
use veriscan_worker::{EventQueue, EventQueueConfig, ScanOutcome, ScanWorker};

struct Pipeline {
    status_store: Arc<MemoryStatusStore>,
    raw_store: Arc<MemoryObjectStore>,
    clean_store: Arc<MemoryObjectStore>,
    worker: ScanWorker,
}

fn pipeline_with_scanner(scanner: StubScanner) -> Pipeline {
    let status_store = Arc::new(MemoryStatusStore::new());
    let raw_store = Arc::new(MemoryObjectStore::new());
    let clean_store = Arc::new(MemoryObjectStore::new());
    let worker = ScanWorker::new(
        status_store.clone(),
        raw_store.clone(),
        clean_store.clone(),
        Arc::new(scanner),
        3,
    );
    Pipeline {
        status_store,
        raw_store,
        clean_store,
        worker,
    }
}

fn pipeline() -> Pipeline {
    pipeline_with_scanner(StubScanner::new())
}

impl Pipeline {
    /// What intake does for an accepted upload: store the raw object and
    /// append the initial PENDING record, then emit the event.
    async fn ingest(&self, file_name: &str, data: &[u8]) -> (Uuid, ObjectCreatedEvent) {
        let file_id = Uuid::new_v4();
        let key = raw_object_key(file_id, file_name);
        self.raw_store
            .put(&key, data.to_vec())
            .await
            .expect("raw put");

        let record = FileRecord::initial(
            file_id,
            sha256_hex(data),
            key.clone(),
            file_name.to_string(),
        );
        self.status_store.put_record(&record).await.expect("initial record");

        let event = ObjectCreatedEvent {
            bucket: "raw".to_string(),
            key,
            event_type: EventType::ObjectCreated,
        };
        (file_id, event)
    }
}

#[tokio::test]
async fn clean_upload_is_promoted() {
    let p = pipeline();
    let data = b"quarterly report contents";
    let (file_id, event) = p.ingest("report.pdf", data).await;

    let outcome = p.worker.handle_event(&event).await.unwrap();
    assert_eq!(outcome, ScanOutcome::Promoted);

    let latest = p.status_store.get_latest(file_id).await.unwrap();
    assert_eq!(latest.status, ScanStatus::Clean);

    let clean_key = clean_object_key(&sha256_hex(data));
    assert_eq!(latest.object_ref, clean_key);
    assert_eq!(p.clean_store.get(&clean_key).await.unwrap(), data);
    assert!(!p.raw_store.exists(&event.key).await.unwrap());

    let history = p.status_store.get_history(file_id).await.unwrap();
    let statuses: Vec<ScanStatus> = history.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![ScanStatus::Pending, ScanStatus::Scanning, ScanStatus::Clean]
    );
}

#[tokio::test]
async fn infected_upload_is_quarantined_and_never_promoted() {
    let p = pipeline();
    let mut data = b"invoice ".to_vec();
    data.extend_from_slice(INFECTED_MARKER);
    let (file_id, event) = p.ingest("invoice.zip", &data).await;

    let outcome = p.worker.handle_event(&event).await.unwrap();
    assert_eq!(outcome, ScanOutcome::Quarantined);

    let latest = p.status_store.get_latest(file_id).await.unwrap();
    assert_eq!(latest.status, ScanStatus::Infected);
    assert!(latest.detail.as_deref().unwrap().contains("threat detected"));

    assert!(!p.raw_store.exists(&event.key).await.unwrap());
    let clean_key = clean_object_key(&sha256_hex(&data));
    assert!(!p.clean_store.exists(&clean_key).await.unwrap());
}

#[tokio::test]
async fn duplicate_delivery_after_terminal_is_a_no_op() {
    let p = pipeline();
    let data = b"clean file";
    let (file_id, event) = p.ingest("notes.txt", data).await;

    assert_eq!(
        p.worker.handle_event(&event).await.unwrap(),
        ScanOutcome::Promoted
    );
    assert_eq!(
        p.worker.handle_event(&event).await.unwrap(),
        ScanOutcome::AlreadyTerminal
    );

    // No records appended past the terminal one.
    let history = p.status_store.get_history(file_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.last().unwrap().status, ScanStatus::Clean);
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_produce_one_terminal_record() {
    let p = Arc::new(pipeline());
    let data = b"raced upload";
    let (file_id, event) = p.ingest("deck.pptx", data).await;

    let a = {
        let p = p.clone();
        let event = event.clone();
        tokio::spawn(async move { p.worker.handle_event(&event).await })
    };
    let b = {
        let p = p.clone();
        let event = event.clone();
        tokio::spawn(async move { p.worker.handle_event(&event).await })
    };

    let (ra, rb) = tokio::join!(a, b);
    let outcomes = [ra.unwrap().unwrap(), rb.unwrap().unwrap()];
    assert!(outcomes.contains(&ScanOutcome::Promoted));

    let history = p.status_store.get_history(file_id).await.unwrap();
    // Exactly one terminal record regardless of interleaving.
    let terminal = history.iter().filter(|r| r.status.is_terminal()).count();
    assert_eq!(terminal, 1);
    assert_eq!(history.last().unwrap().status, ScanStatus::Clean);

    // Sequences strictly increase with no gaps from zero.
    for (i, record) in history.iter().enumerate() {
        assert_eq!(record.sequence, i as i64);
    }

    let clean_key = clean_object_key(&sha256_hex(data));
    assert_eq!(p.clean_store.get(&clean_key).await.unwrap(), data);
}

#[tokio::test]
async fn engine_failures_consume_retry_budget_then_succeed() {
    let p = pipeline_with_scanner(StubScanner::fail_next(2));
    let data = b"eventually scannable";
    let (file_id, event) = p.ingest("archive.zip", data).await;

    // Attempt 1: fails, leaves the file recoverable.
    let err = p.worker.handle_event(&event).await.unwrap_err();
    assert!(err.is_recoverable());
    let latest = p.status_store.get_latest(file_id).await.unwrap();
    assert_eq!(latest.status, ScanStatus::Pending);
    assert_eq!(latest.retry_count, 1);

    // Attempt 2 (redelivery): fails again.
    let err = p.worker.handle_event(&event).await.unwrap_err();
    assert!(err.is_recoverable());
    let latest = p.status_store.get_latest(file_id).await.unwrap();
    assert_eq!(latest.retry_count, 2);

    // Attempt 3: engine recovers and the file is promoted.
    let outcome = p.worker.handle_event(&event).await.unwrap();
    assert_eq!(outcome, ScanOutcome::Promoted);
    let latest = p.status_store.get_latest(file_id).await.unwrap();
    assert_eq!(latest.status, ScanStatus::Clean);
}

#[tokio::test]
async fn exhausted_retry_budget_marks_file_failed() {
    let p = pipeline();
    let mut data = b"always breaks the engine ".to_vec();
    data.extend_from_slice(ENGINE_ERROR_MARKER);
    let (file_id, event) = p.ingest("broken.bin", &data).await;

    for _ in 0..2 {
        let err = p.worker.handle_event(&event).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    // Third attempt exhausts the budget of 3.
    let outcome = p.worker.handle_event(&event).await.unwrap();
    assert_eq!(outcome, ScanOutcome::FailedTerminal);

    let latest = p.status_store.get_latest(file_id).await.unwrap();
    assert_eq!(latest.status, ScanStatus::Failed);
    assert_eq!(latest.retry_count, 3);
    assert!(latest.detail.as_deref().unwrap().contains("after 3 attempts"));

    // A stray redelivery after FAILED stays a no-op.
    assert_eq!(
        p.worker.handle_event(&event).await.unwrap(),
        ScanOutcome::AlreadyTerminal
    );
}

#[tokio::test]
async fn same_content_uploaded_twice_dedupes_in_clean_store() {
    let p = pipeline();
    let data = b"shared attachment";
    let (first, event_a) = p.ingest("a.pdf", data).await;
    let (second, event_b) = p.ingest("b.pdf", data).await;
    assert_ne!(first, second);

    assert_eq!(
        p.worker.handle_event(&event_a).await.unwrap(),
        ScanOutcome::Promoted
    );
    assert_eq!(
        p.worker.handle_event(&event_b).await.unwrap(),
        ScanOutcome::Promoted
    );

    // Both uploads reach CLEAN independently.
    assert_eq!(
        p.status_store.get_latest(first).await.unwrap().status,
        ScanStatus::Clean
    );
    assert_eq!(
        p.status_store.get_latest(second).await.unwrap().status,
        ScanStatus::Clean
    );

    // One clean object for the shared checksum.
    let keys = p.clean_store.list_keys("clean/").await.unwrap();
    assert_eq!(keys.len(), 1);
}

#[tokio::test]
async fn promotion_resumes_after_crash_between_delete_and_record() {
    let p = pipeline();
    let data = b"interrupted promotion";
    let (file_id, event) = p.ingest("resume.docx", data).await;

    // Simulate a crash after the clean copy and raw delete but before the
    // CLEAN record: clean object exists, raw is gone, status is non-terminal.
    let checksum = sha256_hex(data);
    p.clean_store
        .put_if_absent(&clean_object_key(&checksum), data.to_vec())
        .await
        .unwrap();
    p.raw_store.delete(&event.key).await.unwrap();

    let outcome = p.worker.handle_event(&event).await.unwrap();
    assert_eq!(outcome, ScanOutcome::Promoted);
    assert_eq!(
        p.status_store.get_latest(file_id).await.unwrap().status,
        ScanStatus::Clean
    );
}

#[tokio::test]
async fn delivery_cap_resolves_file_to_terminal_failed() {
    let status_store = Arc::new(MemoryStatusStore::new());
    let raw_store = Arc::new(MemoryObjectStore::new());
    let clean_store = Arc::new(MemoryObjectStore::new());
    // Engine never recovers and the scan budget outlives the delivery cap,
    // so the queue gives up while the file is still non-terminal.
    let worker = Arc::new(ScanWorker::new(
        status_store.clone(),
        raw_store.clone(),
        clean_store,
        Arc::new(StubScanner::fail_next(u32::MAX)),
        5,
    ));

    let data = b"never scannable";
    let file_id = Uuid::new_v4();
    let key = raw_object_key(file_id, "stuck.pdf");
    raw_store.put(&key, data.to_vec()).await.unwrap();
    status_store
        .put_record(&FileRecord::initial(
            file_id,
            sha256_hex(data),
            key.clone(),
            "stuck.pdf".to_string(),
        ))
        .await
        .unwrap();

    let (finished_tx, mut finished_rx) = tokio::sync::mpsc::channel(8);
    let queue = EventQueue::new_with_finished(
        EventQueueConfig {
            max_workers: 2,
            max_deliveries: 2,
            retry_backoff_ms: 5,
        },
        worker,
        Some(finished_tx),
    );
    queue
        .submit(ObjectCreatedEvent {
            bucket: "raw".to_string(),
            key,
            event_type: EventType::ObjectCreated,
        })
        .await
        .unwrap();

    let (_, outcome) = finished_rx.recv().await.unwrap();
    assert_eq!(outcome, None);

    // The file still ends terminal; nothing is left stranded at PENDING.
    let latest = status_store.get_latest(file_id).await.unwrap();
    assert_eq!(latest.status, ScanStatus::Failed);
    assert!(latest
        .detail
        .as_deref()
        .unwrap()
        .contains("delivery attempts exhausted"));

    queue.shutdown().await;
}

#[tokio::test]
async fn event_for_unknown_file_is_unrecoverable() {
    let p = pipeline();
    let event = ObjectCreatedEvent {
        bucket: "raw".to_string(),
        key: raw_object_key(Uuid::new_v4(), "ghost.pdf"),
        event_type: EventType::ObjectCreated,
    };

    let err = p.worker.handle_event(&event).await.unwrap_err();
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn malformed_event_key_is_unrecoverable() {
    let p = pipeline();
    let event = ObjectCreatedEvent {
        bucket: "raw".to_string(),
        key: "not-a-raw-key".to_string(),
        event_type: EventType::ObjectCreated,
    };

    let err = p.worker.handle_event(&event).await.unwrap_err();
    assert!(!err.is_recoverable());
}
