use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use memora_upload::prelude::*;
use memora_upload::{ConfirmRequest, InitRequest, ProgressSink, UploadTarget};

/// Test transport with per-file gates and scripted failures
///
/// `init_upload` keys the target by filename so `transfer` can look up
/// its script. A gate installed before enqueue makes the transfer wait
/// until the test releases it.
#[derive(Clone, Default)]
struct ScriptedTransport {
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
    init_failures: Arc<Mutex<HashMap<String, usize>>>,
    transfer_failures: Arc<Mutex<HashMap<String, usize>>>,
    confirms: Arc<Mutex<Vec<ConfirmRequest>>>,
}

impl ScriptedTransport {
    fn gate(&self, filename: &str) -> Arc<Notify> {
        self.gates
            .lock()
            .entry(filename.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn fail_init(&self, filename: &str, times: usize) {
        self.init_failures.lock().insert(filename.to_string(), times);
    }

    fn fail_transfer(&self, filename: &str, times: usize) {
        self.transfer_failures
            .lock()
            .insert(filename.to_string(), times);
    }

    fn confirmed(&self) -> Vec<ConfirmRequest> {
        self.confirms.lock().clone()
    }
}

fn take_failure(map: &Mutex<HashMap<String, usize>>, key: &str) -> bool {
    let mut map = map.lock();
    match map.get_mut(key) {
        Some(n) if *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn init_upload(
        &self,
        _delivery_id: &DeliveryId,
        request: InitRequest,
    ) -> UploadResult<UploadTarget> {
        if take_failure(&self.init_failures, &request.filename) {
            return Err(UploadError::init("scripted init failure"));
        }
        Ok(UploadTarget {
            upload_id: request.filename.clone(),
            upload_url: format!("https://storage.test/{}", request.filename),
            key: format!("uploads/{}", request.filename),
        })
    }

    async fn transfer(
        &self,
        target: &UploadTarget,
        _payload: Bytes,
        _content_type: &str,
        on_progress: ProgressSink,
    ) -> UploadResult<()> {
        on_progress(40);

        let gate = self.gates.lock().get(&target.upload_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if take_failure(&self.transfer_failures, &target.upload_id) {
            return Err(UploadError::transfer("scripted transfer failure"));
        }
        on_progress(100);
        Ok(())
    }

    async fn confirm_upload(
        &self,
        _delivery_id: &DeliveryId,
        receipt: ConfirmRequest,
    ) -> UploadResult<()> {
        self.confirms.lock().push(receipt);
        Ok(())
    }
}

/// Pass-through compression stage
struct NoopCompressor;

#[async_trait]
impl Compressor for NoopCompressor {
    fn is_compressible(&self, _file: &SourceFile) -> bool {
        false
    }

    async fn compress(
        &self,
        file: &SourceFile,
        _options: &CompressionOptions,
    ) -> UploadResult<Bytes> {
        Ok(file.bytes.clone())
    }
}

/// Compressor that always fails - the pipeline must fall back
struct FailingCompressor;

#[async_trait]
impl Compressor for FailingCompressor {
    fn is_compressible(&self, _file: &SourceFile) -> bool {
        true
    }

    async fn compress(
        &self,
        _file: &SourceFile,
        _options: &CompressionOptions,
    ) -> UploadResult<Bytes> {
        Err(UploadError::compression("scripted compression failure"))
    }
}

/// Compressor that replaces the payload with a small fixed one
struct ShrinkingCompressor;

#[async_trait]
impl Compressor for ShrinkingCompressor {
    fn is_compressible(&self, _file: &SourceFile) -> bool {
        true
    }

    async fn compress(
        &self,
        _file: &SourceFile,
        _options: &CompressionOptions,
    ) -> UploadResult<Bytes> {
        Ok(Bytes::from_static(b"tiny"))
    }
}

/// Test factory functions
fn test_file(name: &str) -> SourceFile {
    SourceFile::new(name, "image/jpeg", Bytes::from(vec![1u8; 1024]))
}

fn test_uploader(
    transport: ScriptedTransport,
    max_concurrent: usize,
) -> Uploader<ScriptedTransport, NoopCompressor> {
    Uploader::with_compressor(
        DeliveryId::new(),
        transport,
        NoopCompressor,
        UploaderConfig::default().with_max_concurrent(max_concurrent),
    )
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timeout waiting for {what}");
}

fn status_of(
    uploader: &Uploader<ScriptedTransport, NoopCompressor>,
    id: &ItemId,
) -> Option<UploadStatus> {
    uploader.get(id).map(|item| item.status)
}

/// With max_concurrent = 2 and three files, A and B begin
/// immediately, C waits; when A completes C begins; B's transfer
/// failure does not block C.
#[tokio::test]
async fn bounded_admission_with_error_isolation() {
    let transport = ScriptedTransport::default();
    let gate_a = transport.gate("a.jpg");
    let gate_b = transport.gate("b.jpg");
    let gate_c = transport.gate("c.jpg");
    transport.fail_transfer("b.jpg", 1);

    let drains = Arc::new(AtomicUsize::new(0));
    let drain_counter = drains.clone();
    let uploader = test_uploader(transport.clone(), 2)
        .with_on_all_complete(move || {
            drain_counter.fetch_add(1, Ordering::SeqCst);
        });

    let ids = uploader.enqueue(vec![test_file("a.jpg"), test_file("b.jpg"), test_file("c.jpg")]);
    assert_eq!(ids.len(), 3);
    let (a, b, c) = (&ids[0], &ids[1], &ids[2]);

    // A and B start, C stays queued behind the cap.
    wait_until("a and b uploading", || {
        status_of(&uploader, a) == Some(UploadStatus::Uploading)
            && status_of(&uploader, b) == Some(UploadStatus::Uploading)
    })
    .await;
    assert_eq!(status_of(&uploader, c), Some(UploadStatus::Queued));

    let active = uploader
        .items()
        .iter()
        .filter(|item| item.status.is_active())
        .count();
    assert!(active <= 2, "concurrency bound violated: {active} active");

    // A finishes and frees the slot for C.
    gate_a.notify_one();
    wait_until("a complete", || {
        status_of(&uploader, a) == Some(UploadStatus::Complete)
    })
    .await;
    wait_until("c admitted", || {
        status_of(&uploader, c)
            .map(|s| s.is_active())
            .unwrap_or(false)
    })
    .await;

    // B fails without affecting C.
    gate_b.notify_one();
    wait_until("b errored", || {
        status_of(&uploader, b) == Some(UploadStatus::Error)
    })
    .await;
    let item_b = uploader.get(b).unwrap();
    assert!(item_b.error.as_deref().unwrap().contains("transfer failed"));
    assert!(status_of(&uploader, c).unwrap() != UploadStatus::Error);

    gate_c.notify_one();
    wait_until("c complete", || {
        status_of(&uploader, c) == Some(UploadStatus::Complete)
    })
    .await;
    wait_until("drain callback", || drains.load(Ordering::SeqCst) == 1).await;

    let summary = uploader.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed_count, 2);
    assert!(summary.has_errors);
    assert!(!summary.is_uploading);
}

/// When compression fails, the pipeline continues with the
/// original payload and the item still completes.
#[tokio::test]
async fn compression_failure_falls_back_to_original_payload() {
    let transport = ScriptedTransport::default();
    let uploader = Uploader::with_compressor(
        DeliveryId::new(),
        transport.clone(),
        FailingCompressor,
        UploaderConfig::default(),
    );
    let mut events = uploader.subscribe();

    let ids = uploader.enqueue(vec![test_file("a.jpg")]);
    wait_until("item complete", || {
        uploader.get(&ids[0]).map(|i| i.status) == Some(UploadStatus::Complete)
    })
    .await;

    // Confirmed with the original size, not a compressed one.
    let confirms = transport.confirmed();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].size_bytes, 1024);

    // The item passed through uploading with head-room progress, and
    // never through error.
    let mut saw_uploading = false;
    while let Ok(event) = events.try_recv() {
        match event {
            UploadEvent::StageChanged { status, .. } if status == UploadStatus::Uploading => {
                saw_uploading = true
            }
            UploadEvent::Failed { .. } => panic!("compression failure surfaced as item error"),
            _ => {}
        }
    }
    assert!(saw_uploading);
}

/// The confirmed size reflects the compressed payload when
/// compression succeeds.
#[tokio::test]
async fn confirm_carries_final_payload_size() {
    let transport = ScriptedTransport::default();
    let uploader = Uploader::with_compressor(
        DeliveryId::new(),
        transport.clone(),
        ShrinkingCompressor,
        UploaderConfig::default(),
    );

    let ids = uploader.enqueue(vec![test_file("a.jpg")]);
    wait_until("item complete", || {
        uploader.get(&ids[0]).map(|i| i.status) == Some(UploadStatus::Complete)
    })
    .await;

    let confirms = transport.confirmed();
    assert_eq!(confirms[0].size_bytes, 4);
    assert_eq!(confirms[0].filename, "a.jpg");
}

/// Removing an in-flight item detaches it; the
/// pipeline's eventual resolution must not resurrect it.
#[tokio::test]
async fn remove_in_flight_item_stays_removed() {
    let transport = ScriptedTransport::default();
    let gate = transport.gate("a.jpg");
    let uploader = test_uploader(transport, 1);

    let ids = uploader.enqueue(vec![test_file("a.jpg")]);
    let id = &ids[0];

    wait_until("mid-transfer progress", || {
        uploader.get(id).map(|i| i.progress > 5).unwrap_or(false)
    })
    .await;

    assert!(uploader.remove(id));
    assert!(uploader.get(id).is_none());
    assert!(!uploader.remove(id));

    // Let the detached transfer resolve; nothing may reappear.
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(uploader.get(id).is_none());
    assert!(uploader.items().is_empty());
    assert_eq!(uploader.summary(), UploadSummary::default());
}

/// Retry on an errored item resets it and re-enters the pipeline;
/// retry on anything else is a no-op.
#[tokio::test]
async fn retry_resets_and_requeues_errored_items_only() {
    let transport = ScriptedTransport::default();
    transport.fail_transfer("a.jpg", 1);
    let uploader = test_uploader(transport, 1);
    let mut events = uploader.subscribe();

    let ids = uploader.enqueue(vec![test_file("a.jpg")]);
    let id = &ids[0];

    wait_until("item errored", || {
        status_of(&uploader, id) == Some(UploadStatus::Error)
    })
    .await;
    assert!(uploader.get(id).unwrap().error.is_some());

    // The single scripted failure is consumed; the retry succeeds.
    assert!(uploader.retry(id));
    wait_until("retried item complete", || {
        status_of(&uploader, id) == Some(UploadStatus::Complete)
    })
    .await;
    let item = uploader.get(id).unwrap();
    assert_eq!(item.progress, 100);
    assert!(item.error.is_none());

    // Retry on a complete item is an idempotent guard, not an error.
    assert!(!uploader.retry(id));
    assert_eq!(status_of(&uploader, id), Some(UploadStatus::Complete));

    // Retry on a missing item is equally silent.
    assert!(!uploader.retry(&ItemId::new()));

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.event_name());
    }
    assert_eq!(names.iter().filter(|n| **n == "retried").count(), 1);
}

/// Retry on an in-flight item must not double-schedule it.
#[tokio::test]
async fn retry_on_in_flight_item_is_a_noop() {
    let transport = ScriptedTransport::default();
    let gate = transport.gate("a.jpg");
    let uploader = test_uploader(transport, 1);

    let ids = uploader.enqueue(vec![test_file("a.jpg")]);
    let id = &ids[0];
    wait_until("item uploading", || {
        status_of(&uploader, id) == Some(UploadStatus::Uploading)
    })
    .await;

    assert!(!uploader.retry(id));
    assert_eq!(status_of(&uploader, id), Some(UploadStatus::Uploading));

    gate.notify_one();
    wait_until("item complete", || {
        status_of(&uploader, id) == Some(UploadStatus::Complete)
    })
    .await;
}

/// clear() tears the session down; pipelines from the cleared session
/// can neither repopulate the store nor fire the drain callback.
#[tokio::test]
async fn clear_detaches_the_whole_session() {
    let transport = ScriptedTransport::default();
    let gate = transport.gate("a.jpg");

    let drains = Arc::new(AtomicUsize::new(0));
    let drain_counter = drains.clone();
    let uploader = test_uploader(transport, 1).with_on_all_complete(move || {
        drain_counter.fetch_add(1, Ordering::SeqCst);
    });

    let ids = uploader.enqueue(vec![test_file("a.jpg"), test_file("b.jpg")]);
    wait_until("a uploading", || {
        status_of(&uploader, &ids[0]) == Some(UploadStatus::Uploading)
    })
    .await;

    uploader.clear();
    assert!(uploader.items().is_empty());
    assert_eq!(uploader.summary(), UploadSummary::default());

    // The stale pipeline finishes after the clear.
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(uploader.items().is_empty());
    assert_eq!(drains.load(Ordering::SeqCst), 0, "stale drain fired");

    // The new session works normally.
    let new_ids = uploader.enqueue(vec![test_file("c.jpg")]);
    wait_until("new session item complete", || {
        status_of(&uploader, &new_ids[0]) == Some(UploadStatus::Complete)
    })
    .await;
    wait_until("new session drain", || drains.load(Ordering::SeqCst) == 1).await;
}

/// Event protocol: a successful upload emits the lifecycle in order
/// and invalidates the delivery's asset list.
#[tokio::test]
async fn emits_lifecycle_events_in_order() {
    let transport = ScriptedTransport::default();

    let completions = Arc::new(Mutex::new(Vec::new()));
    let record = completions.clone();
    let drains = Arc::new(AtomicUsize::new(0));
    let drain_counter = drains.clone();
    let uploader = test_uploader(transport, 3)
        .with_on_item_complete(move |_id, filename| {
            record.lock().push(filename.to_string());
        })
        .with_on_all_complete(move || {
            drain_counter.fetch_add(1, Ordering::SeqCst);
        });
    let mut events = uploader.subscribe();

    let ids = uploader.enqueue(vec![test_file("a.jpg")]);
    wait_until("queue drained", || drains.load(Ordering::SeqCst) == 1).await;
    assert_eq!(
        status_of(&uploader, &ids[0]),
        Some(UploadStatus::Complete)
    );
    assert_eq!(completions.lock().clone(), vec!["a.jpg".to_string()]);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Some(item_id) = event.item_id() {
            assert_eq!(item_id, &ids[0]);
        }
        names.push(event.event_name());
    }

    let position = |name: &str| {
        names
            .iter()
            .position(|n| *n == name)
            .unwrap_or_else(|| panic!("missing {name} event in {names:?}"))
    };
    assert!(position("enqueued") < position("stage_changed"));
    assert!(position("stage_changed") < position("progress"));
    assert!(position("progress") < position("completed"));
    assert!(position("completed") < position("assets_invalidated"));
    assert!(position("assets_invalidated") <= position("drained"));
}

/// An init failure surfaces like any other stage failure, with the
/// stage named in the message.
#[tokio::test]
async fn init_failure_moves_item_to_error() {
    let transport = ScriptedTransport::default();
    transport.fail_init("a.jpg", 1);
    let uploader = test_uploader(transport, 1);

    let ids = uploader.enqueue(vec![test_file("a.jpg")]);
    wait_until("item errored", || {
        status_of(&uploader, &ids[0]) == Some(UploadStatus::Error)
    })
    .await;

    let item = uploader.get(&ids[0]).unwrap();
    assert!(item
        .error
        .as_deref()
        .unwrap()
        .contains("upload initiation failed"));
    // Progress never reached the transfer band.
    assert_eq!(item.progress, 5);
}

/// Conservation: every enqueued item ends complete or errored once
/// the queue drains.
#[tokio::test]
async fn every_item_reaches_a_terminal_state() {
    let transport = ScriptedTransport::default();
    transport.fail_transfer("c.jpg", 1);
    let uploader = test_uploader(transport, 2);

    let files = vec![
        test_file("a.jpg"),
        test_file("b.jpg"),
        test_file("c.jpg"),
        test_file("d.jpg"),
        test_file("e.jpg"),
    ];
    let ids = uploader.enqueue(files);

    wait_until("all terminal", || {
        ids.iter().all(|id| {
            status_of(&uploader, id)
                .map(|s| s.is_terminal())
                .unwrap_or(false)
        })
    })
    .await;

    let summary = uploader.summary();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.completed_count, 4);
    assert_eq!(summary.error_count, 1);
}
