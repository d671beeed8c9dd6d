#[cfg(feature = "http")]
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::UploadResult;
use crate::types::DeliveryId;

#[cfg(feature = "http")]
pub use http::HttpTransport;

/// Callback invoked with raw transfer progress in 0..=100
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Request for a one-time write target for a specific file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Negotiated write target: a pre-authorized URL the client may write
/// to directly, plus the key the object will live under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTarget {
    pub upload_id: String,
    pub upload_url: String,
    pub key: String,
}

/// Receipt registering the uploaded object against its delivery
///
/// `size_bytes` is the final (possibly compressed) payload size, not
/// the original file size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub upload_id: String,
    pub key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Transport boundary for the three network round trips of an upload
///
/// Confirmation is the durability boundary: before `confirm_upload`
/// returns, the transferred bytes exist in storage but are not part of
/// the delivery's recognized asset set.
#[async_trait]
pub trait UploadTransport: Send + Sync + 'static {
    /// Negotiate a one-time write target within the delivery's
    /// namespace
    async fn init_upload(
        &self,
        delivery_id: &DeliveryId,
        request: InitRequest,
    ) -> UploadResult<UploadTarget>;

    /// Stream the payload to the write target, reporting raw progress
    /// through the sink
    async fn transfer(
        &self,
        target: &UploadTarget,
        payload: Bytes,
        content_type: &str,
        on_progress: ProgressSink,
    ) -> UploadResult<()>;

    /// Register the object at `key` with the delivery's asset set
    async fn confirm_upload(
        &self,
        delivery_id: &DeliveryId,
        receipt: ConfirmRequest,
    ) -> UploadResult<()>;
}
