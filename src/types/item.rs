use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeliveryId, ItemId, SourceFile};

/// Progress assigned on entry to the uploading stage, reserving head
/// room ahead of the init round trip
pub const UPLOAD_HEAD_PROGRESS: u8 = 5;

/// Upload item status lifecycle
///
/// `Queued` is the only initial state. `Complete` is terminal; `Error`
/// is terminal until an explicit retry re-enters at `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    /// Waiting for a free concurrency slot
    Queued,

    /// Best-effort payload size reduction in progress
    Compressing,

    /// Init/transfer/confirm round trips in progress
    Uploading,

    /// Confirmed against the delivery - durably registered
    Complete,

    /// A pipeline stage failed; recoverable only via explicit retry
    Error,
}

impl UploadStatus {
    /// Check if the item is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Check if the item currently occupies a concurrency slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Compressing | Self::Uploading)
    }

    /// Get the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Compressing => "compressing",
            Self::Uploading => "uploading",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// Upload item record - one file's journey through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadItem {
    /// Unique item identifier
    pub id: ItemId,

    /// Delivery the asset belongs to
    pub delivery_id: DeliveryId,

    /// Immutable source payload
    pub file: SourceFile,

    /// Current status
    pub status: UploadStatus,

    /// Progress in 0..=100, monotonically non-decreasing within a
    /// single pipeline run (reset to 0 on retry)
    pub progress: u8,

    /// Failure reason, present only while status is `Error`
    pub error: Option<String>,

    /// When the item was created
    pub created_at: DateTime<Utc>,

    /// When the item was last updated
    pub updated_at: DateTime<Utc>,
}

impl UploadItem {
    /// Create a new queued item for a delivery
    pub fn new(delivery_id: DeliveryId, file: SourceFile) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            delivery_id,
            file,
            status: UploadStatus::Queued,
            progress: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enter the compression stage
    pub fn begin_compressing(&mut self) {
        self.status = UploadStatus::Compressing;
        self.progress = 0;
        self.touch();
    }

    /// Enter the uploading stage
    pub fn begin_uploading(&mut self) {
        self.status = UploadStatus::Uploading;
        self.progress = UPLOAD_HEAD_PROGRESS;
        self.touch();
    }

    /// Record transfer progress; non-monotonic writes are ignored so a
    /// late callback can never move the bar backwards
    pub fn set_progress(&mut self, progress: u8) {
        let progress = progress.min(100);
        if progress > self.progress {
            self.progress = progress;
            self.touch();
        }
    }

    /// Mark the item complete
    pub fn complete(&mut self) {
        self.status = UploadStatus::Complete;
        self.progress = 100;
        self.error = None;
        self.touch();
    }

    /// Mark the item failed; progress stays at its last value
    pub fn fail(&mut self, error: String) {
        self.status = UploadStatus::Error;
        self.error = Some(error);
        self.touch();
    }

    /// Reset the item for a retry, re-entering at `Queued`
    pub fn reset_for_retry(&mut self) {
        self.status = UploadStatus::Queued;
        self.progress = 0;
        self.error = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn test_item() -> UploadItem {
        UploadItem::new(
            DeliveryId::new(),
            SourceFile::new("a.jpg", "image/jpeg", Bytes::from_static(b"abc")),
        )
    }

    #[test]
    fn new_item_is_queued_at_zero() {
        let item = test_item();
        assert_eq!(item.status, UploadStatus::Queued);
        assert_eq!(item.progress, 0);
        assert!(item.error.is_none());
    }

    #[test]
    fn progress_is_monotonic_within_a_run() {
        let mut item = test_item();
        item.begin_uploading();
        item.set_progress(50);
        item.set_progress(40);
        assert_eq!(item.progress, 50);
        item.set_progress(101);
        assert_eq!(item.progress, 100);
    }

    #[test]
    fn fail_keeps_last_progress() {
        let mut item = test_item();
        item.begin_uploading();
        item.set_progress(40);
        item.fail("transfer failed: boom".to_string());
        assert_eq!(item.status, UploadStatus::Error);
        assert_eq!(item.progress, 40);
        assert_eq!(item.error.as_deref(), Some("transfer failed: boom"));
    }

    #[test]
    fn retry_reset_clears_error_and_progress() {
        let mut item = test_item();
        item.begin_uploading();
        item.fail("boom".to_string());
        item.reset_for_retry();
        assert_eq!(item.status, UploadStatus::Queued);
        assert_eq!(item.progress, 0);
        assert!(item.error.is_none());
    }

    #[test]
    fn active_and_terminal_flags() {
        assert!(UploadStatus::Compressing.is_active());
        assert!(UploadStatus::Uploading.is_active());
        assert!(!UploadStatus::Queued.is_active());
        assert!(UploadStatus::Complete.is_terminal());
        assert!(UploadStatus::Error.is_terminal());
        assert!(!UploadStatus::Uploading.is_terminal());
    }
}
