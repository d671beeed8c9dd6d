//! # memora-upload: Client-Side Upload Orchestration
//!
//! Bounded-concurrency, multi-stage upload pipeline for Memora
//! deliveries: each enqueued file runs compression → init → transfer →
//! confirmation independently, with at most `max_concurrent` items in
//! flight and per-item progress, retry and removal semantics.
//!
//! ## Design
//!
//! - **Item store as single source of truth**: every derived value
//!   (counts, flags, aggregate progress) is recomputed from store
//!   snapshots, never kept as separate mutable state.
//! - **Explicit scheduler**: the pending queue and concurrency counter
//!   live in one lock-guarded structure with `admit`/`release`
//!   semantics, so no callback can decrement against a stale read.
//! - **Framework-agnostic observer protocol**: the orchestrator
//!   broadcasts [`UploadEvent`]s; UI layers are pure subscribers.
//! - **Manual retry only**: failures are durable until the user acts,
//!   and removal detaches an item without aborting its in-flight I/O.
//!
//! ## Quick start
//!
//! ```no_run
//! use bytes::Bytes;
//! use memora_upload::prelude::*;
//! use memora_upload::transport::HttpTransport;
//!
//! # async fn demo() {
//! let transport = HttpTransport::new("https://api.memora.app");
//! let uploader = Uploader::new(DeliveryId::new(), transport, UploaderConfig::default())
//!     .with_on_all_complete(|| println!("all uploads finished"));
//!
//! uploader.enqueue(vec![SourceFile::new(
//!     "first-steps.jpg",
//!     "image/jpeg",
//!     Bytes::from_static(b"..."),
//! )]);
//!
//! let mut events = uploader.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.event_name());
//! }
//! # }
//! ```

pub mod compress;
pub mod config;
pub mod error;
pub mod sched;
pub mod store;
pub mod summary;
pub mod transport;
pub mod types;
pub mod uploader;

// Core API exports
pub use compress::{CompressionOptions, Compressor};
pub use config::UploaderConfig;
pub use error::{UploadError, UploadResult};
pub use store::ItemStore;
pub use summary::UploadSummary;
pub use transport::{ConfirmRequest, InitRequest, ProgressSink, UploadTarget, UploadTransport};
pub use types::{DeliveryId, ItemId, SourceFile, UploadEvent, UploadItem, UploadStatus};
pub use uploader::{EventStream, Uploader};

#[cfg(feature = "image-compression")]
pub use compress::ImageCompressor;

#[cfg(feature = "http")]
pub use transport::HttpTransport;

/// Prelude for upload orchestration
pub mod prelude {
    // Orchestrator and configuration
    pub use crate::{Uploader, UploaderConfig};

    // Essential types
    pub use crate::{
        DeliveryId, ItemId, SourceFile, UploadError, UploadEvent, UploadItem, UploadResult,
        UploadStatus, UploadSummary,
    };

    // Collaborator seams
    pub use crate::{CompressionOptions, Compressor, UploadTransport};

    // Essential traits
    pub use async_trait::async_trait;
}
