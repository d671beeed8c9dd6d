use serde::{Deserialize, Serialize};

use crate::types::{UploadItem, UploadStatus};

/// Derived view over the item store: counts, flags and aggregate
/// progress
///
/// Pure data recomputed from a snapshot on every read; there is no
/// separate mutable state to keep in sync with the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Total number of items in the store
    pub total: usize,

    /// Items that reached `Complete`
    pub completed_count: usize,

    /// Items currently in `Error`
    pub error_count: usize,

    /// Any item in `Error`
    pub has_errors: bool,

    /// Any item in `Compressing` or `Uploading`
    pub is_uploading: bool,

    /// Rounded arithmetic mean of all items' progress; 0 when the
    /// store is empty
    pub total_progress: u8,
}

impl UploadSummary {
    /// Compute the summary from a store snapshot
    pub fn from_items(items: &[UploadItem]) -> Self {
        let total = items.len();
        let completed_count = items
            .iter()
            .filter(|item| item.status == UploadStatus::Complete)
            .count();
        let error_count = items
            .iter()
            .filter(|item| item.status == UploadStatus::Error)
            .count();
        let is_uploading = items.iter().any(|item| item.status.is_active());

        let total_progress = if total == 0 {
            0
        } else {
            let sum: u32 = items.iter().map(|item| item.progress as u32).sum();
            (sum as f64 / total as f64).round() as u8
        };

        Self {
            total,
            completed_count,
            error_count,
            has_errors: error_count > 0,
            is_uploading,
            total_progress,
        }
    }
}
