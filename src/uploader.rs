use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures_core::Stream;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::compress::Compressor;
use crate::config::UploaderConfig;
use crate::error::UploadResult;
use crate::sched::Scheduler;
use crate::store::ItemStore;
use crate::summary::UploadSummary;
use crate::transport::{ConfirmRequest, InitRequest, ProgressSink, UploadTransport};
use crate::types::{
    DeliveryId, ItemId, SourceFile, UploadEvent, UploadItem, UploadStatus, UPLOAD_HEAD_PROGRESS,
};

#[cfg(feature = "image-compression")]
use crate::compress::ImageCompressor;

/// Type alias for boxed event streams (stable Rust compatible)
pub type EventStream = Pin<Box<dyn Stream<Item = UploadEvent> + Send + 'static>>;

type ItemCompleteHook = Arc<dyn Fn(&ItemId, &str) + Send + Sync>;
type AllCompleteHook = Arc<dyn Fn() + Send + Sync>;

/// Raw transfer progress occupies the 5..=95 band of item progress,
/// leaving visible head room for init and tail room for confirm.
const TRANSFER_BAND: f64 = 0.9;

fn scale_transfer_progress(raw: u8) -> u8 {
    UPLOAD_HEAD_PROGRESS + ((raw.min(100) as f64) * TRANSFER_BAND).round() as u8
}

#[derive(Default)]
struct Hooks {
    item_complete: RwLock<Option<ItemCompleteHook>>,
    all_complete: RwLock<Option<AllCompleteHook>>,
}

struct UploaderInner<T, C> {
    delivery_id: DeliveryId,
    transport: T,
    compressor: C,
    config: UploaderConfig,
    store: ItemStore,
    sched: Scheduler,
    events: broadcast::Sender<UploadEvent>,
    hooks: Hooks,
}

/// Bounded-concurrency upload orchestrator for one delivery
///
/// Drives each enqueued file through compression, init, transfer and
/// confirmation, with at most `max_concurrent` items in flight. All
/// state lives in the item store; UI layers subscribe to the event
/// stream or read snapshots, they never hold state of their own.
///
/// Cheap to clone; clones share the same store, queue and event
/// channel.
pub struct Uploader<T: UploadTransport, C: Compressor> {
    inner: Arc<UploaderInner<T, C>>,
}

impl<T: UploadTransport, C: Compressor> Clone for Uploader<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(feature = "image-compression")]
impl<T: UploadTransport> Uploader<T, ImageCompressor> {
    /// Create an orchestrator with the default image compressor
    pub fn new(delivery_id: DeliveryId, transport: T, config: UploaderConfig) -> Self {
        Self::with_compressor(delivery_id, transport, ImageCompressor::new(), config)
    }
}

impl<T: UploadTransport, C: Compressor> Uploader<T, C> {
    /// Create an orchestrator with a custom compression stage
    pub fn with_compressor(
        delivery_id: DeliveryId,
        transport: T,
        compressor: C,
        config: UploaderConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(1000);
        let sched = Scheduler::new(config.max_concurrent);
        Self {
            inner: Arc::new(UploaderInner {
                delivery_id,
                transport,
                compressor,
                config,
                store: ItemStore::new(),
                sched,
                events,
                hooks: Hooks::default(),
            }),
        }
    }

    /// Register a callback fired after each item is confirmed
    pub fn with_on_item_complete(
        self,
        hook: impl Fn(&ItemId, &str) + Send + Sync + 'static,
    ) -> Self {
        *self.inner.hooks.item_complete.write() = Some(Arc::new(hook));
        self
    }

    /// Register a callback fired once per full queue drain
    pub fn with_on_all_complete(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        *self.inner.hooks.all_complete.write() = Some(Arc::new(hook));
        self
    }

    /// Add files to the store and pending queue, then dispatch
    ///
    /// Returns the assigned item ids in enqueue order. Must be called
    /// from within a tokio runtime: admitted pipelines are spawned as
    /// tasks.
    #[instrument(skip(self, files), fields(delivery_id = %self.inner.delivery_id))]
    pub fn enqueue(&self, files: Vec<SourceFile>) -> Vec<ItemId> {
        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            let item = UploadItem::new(self.inner.delivery_id.clone(), file);
            let id = item.id.clone();
            self.emit(UploadEvent::Enqueued {
                item_id: id.clone(),
                filename: item.file.name.clone(),
                at: Utc::now(),
            });
            // Insert before push: every pending id must exist in the
            // store as queued.
            self.inner.store.insert(item);
            self.inner.sched.push(id.clone());
            ids.push(id);
        }
        info!("enqueued {} item(s)", ids.len());
        self.dispatch();
        ids
    }

    /// Admit queued items while slots are free
    ///
    /// Re-entrant and idempotent: called after enqueue, retry and
    /// every pipeline completion.
    pub fn dispatch(&self) {
        while let Some(granted) = self.inner.sched.admit() {
            let uploader = self.clone();
            tokio::spawn(async move {
                uploader.run_item(&granted.id).await;
                // Slot is released whatever the pipeline outcome.
                match uploader.inner.sched.release(granted.generation) {
                    Some(drained) => {
                        uploader.dispatch();
                        if drained {
                            uploader.finish_drain();
                        }
                    }
                    // Session was cleared while this pipeline ran.
                    None => debug!(item_id = %granted.id, "stale slot release ignored"),
                }
            });
        }
    }

    /// Reset an errored item and re-queue it at the back
    ///
    /// Silent no-op (returns false) for missing or non-error items.
    /// The pipeline restarts from compression; no partial bytes are
    /// reused.
    #[instrument(skip(self))]
    pub fn retry(&self, id: &ItemId) -> bool {
        let mut reset = false;
        self.inner.store.update(id, |item| {
            if item.status == UploadStatus::Error {
                item.reset_for_retry();
                reset = true;
            }
        });
        if !reset {
            return false;
        }

        self.emit(UploadEvent::Retried {
            item_id: id.clone(),
            at: Utc::now(),
        });
        info!(item_id = %id, "retrying upload");
        self.inner.sched.push(id.clone());
        self.dispatch();
        true
    }

    /// Remove an item unconditionally, whatever its state
    ///
    /// An in-flight pipeline is not aborted; its later updates against
    /// the missing id are silent no-ops.
    #[instrument(skip(self))]
    pub fn remove(&self, id: &ItemId) -> bool {
        // Pending first, so dispatch cannot admit an id the store no
        // longer knows.
        self.inner.sched.remove_pending(id);
        let removed = self.inner.store.remove(id);
        if removed {
            self.emit(UploadEvent::Removed {
                item_id: id.clone(),
                at: Utc::now(),
            });
            info!(item_id = %id, "removed upload item");
        }
        removed
    }

    /// Tear down the whole upload session: store, queue and counter
    /// reset in one step
    #[instrument(skip(self))]
    pub fn clear(&self) {
        self.inner.sched.clear();
        self.inner.store.clear();
        self.emit(UploadEvent::Cleared { at: Utc::now() });
        info!("cleared upload session");
    }

    /// Snapshot of all items, in no particular order
    pub fn items(&self) -> Vec<UploadItem> {
        self.inner.store.snapshot()
    }

    /// Get a clone of a single item
    pub fn get(&self, id: &ItemId) -> Option<UploadItem> {
        self.inner.store.get(id)
    }

    /// Derived counts, flags and aggregate progress
    pub fn summary(&self) -> UploadSummary {
        UploadSummary::from_items(&self.inner.store.snapshot())
    }

    /// Subscribe to state-change events
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.inner.events.subscribe()
    }

    /// Event stream for observability (boxed for stable Rust)
    pub fn event_stream(&self) -> EventStream {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};
        let stream = BroadcastStream::new(self.inner.events.subscribe()).filter_map(|r| r.ok());
        Box::pin(stream)
    }

    /// Delivery this orchestrator uploads into
    pub fn delivery_id(&self) -> &DeliveryId {
        &self.inner.delivery_id
    }

    /// Get configuration
    pub fn config(&self) -> &UploaderConfig {
        &self.inner.config
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.inner.events.send(event);
    }

    fn set_stage(&self, id: &ItemId, f: impl FnOnce(&mut UploadItem), status: UploadStatus) -> bool {
        if !self.inner.store.update(id, f) {
            return false;
        }
        self.emit(UploadEvent::StageChanged {
            item_id: id.clone(),
            status,
            at: Utc::now(),
        });
        true
    }

    /// Run the full pipeline for one admitted item
    ///
    /// Every stage error is handled here; nothing propagates to the
    /// scheduler or to sibling pipelines.
    async fn run_item(&self, id: &ItemId) {
        // The item may have been removed while it sat in the queue.
        let Some(item) = self.inner.store.get(id) else {
            debug!(item_id = %id, "item gone before dispatch");
            return;
        };

        if !self.set_stage(id, UploadItem::begin_compressing, UploadStatus::Compressing) {
            return;
        }
        let payload = self.compressed_payload(&item).await;

        if !self.set_stage(id, UploadItem::begin_uploading, UploadStatus::Uploading) {
            return;
        }

        match self.run_transfer(&item, payload).await {
            Ok(()) => {
                if self.inner.store.update(id, UploadItem::complete) {
                    self.emit(UploadEvent::Completed {
                        item_id: id.clone(),
                        at: Utc::now(),
                    });
                    // Dependent views of the delivery's asset list are
                    // stale from this point.
                    self.emit(UploadEvent::AssetsInvalidated {
                        delivery_id: self.inner.delivery_id.clone(),
                        at: Utc::now(),
                    });
                    let hook = self.inner.hooks.item_complete.read().clone();
                    if let Some(hook) = hook {
                        hook(id, &item.file.name);
                    }
                    info!(item_id = %id, filename = %item.file.name, "upload complete");
                }
            }
            Err(err) => {
                let message = err.to_string();
                if self.inner.store.update(id, |it| it.fail(message.clone())) {
                    self.emit(UploadEvent::Failed {
                        item_id: id.clone(),
                        error: message.clone(),
                        at: Utc::now(),
                    });
                    error!(item_id = %id, stage = err.stage(), "{message}");
                }
            }
        }
    }

    /// Best-effort compression; any failure falls back to the
    /// original payload
    async fn compressed_payload(&self, item: &UploadItem) -> Bytes {
        if !self.inner.compressor.is_compressible(&item.file) {
            return item.file.bytes.clone();
        }
        match self
            .inner
            .compressor
            .compress(&item.file, &self.inner.config.compression)
            .await
        {
            Ok(bytes) => {
                debug!(
                    item_id = %item.id,
                    before = item.file.size_bytes,
                    after = bytes.len(),
                    "compressed payload"
                );
                bytes
            }
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "compression failed, using original payload");
                item.file.bytes.clone()
            }
        }
    }

    /// The three network round trips: init, transfer, confirm
    async fn run_transfer(&self, item: &UploadItem, payload: Bytes) -> UploadResult<()> {
        let inner = &self.inner;
        let target = inner
            .transport
            .init_upload(
                &inner.delivery_id,
                InitRequest {
                    filename: item.file.name.clone(),
                    content_type: item.file.content_type.clone(),
                    size_bytes: item.file.size_bytes,
                },
            )
            .await?;
        debug!(item_id = %item.id, upload_id = %target.upload_id, key = %target.key, "write target negotiated");

        let progress_uploader = self.clone();
        let progress_id = item.id.clone();
        let sink: ProgressSink = Arc::new(move |raw| {
            let scaled = scale_transfer_progress(raw);
            let applied = progress_uploader
                .inner
                .store
                .update(&progress_id, |it| it.set_progress(scaled));
            if applied {
                progress_uploader.emit(UploadEvent::Progress {
                    item_id: progress_id.clone(),
                    progress: scaled,
                    at: Utc::now(),
                });
            }
        });
        inner
            .transport
            .transfer(&target, payload.clone(), &item.file.content_type, sink)
            .await?;

        inner
            .transport
            .confirm_upload(
                &inner.delivery_id,
                ConfirmRequest {
                    upload_id: target.upload_id,
                    key: target.key,
                    filename: item.file.name.clone(),
                    content_type: item.file.content_type.clone(),
                    size_bytes: payload.len() as u64,
                },
            )
            .await?;
        Ok(())
    }

    fn finish_drain(&self) {
        self.emit(UploadEvent::Drained { at: Utc::now() });
        let hook = self.inner.hooks.all_complete.read().clone();
        if let Some(hook) = hook {
            hook();
        }
        info!(delivery_id = %self.inner.delivery_id, "upload queue drained");
    }
}
