use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeliveryId, ItemId, UploadStatus};

/// Minimal stable event protocol for upload observability
///
/// The orchestrator broadcasts one of these on every state change so a
/// UI layer can subscribe without holding any state of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UploadEvent {
    /// Item was added to the store and pending queue
    Enqueued {
        item_id: ItemId,
        filename: String,
        at: DateTime<Utc>,
    },

    /// Item moved to a new pipeline stage
    StageChanged {
        item_id: ItemId,
        status: UploadStatus,
        at: DateTime<Utc>,
    },

    /// Transfer progress was recorded for an item
    Progress {
        item_id: ItemId,
        progress: u8,
        at: DateTime<Utc>,
    },

    /// Item was confirmed against its delivery
    Completed { item_id: ItemId, at: DateTime<Utc> },

    /// A pipeline stage failed for an item
    Failed {
        item_id: ItemId,
        error: String,
        at: DateTime<Utc>,
    },

    /// Item was reset and re-queued after an explicit retry
    Retried { item_id: ItemId, at: DateTime<Utc> },

    /// Item was removed from the store and pending queue
    Removed { item_id: ItemId, at: DateTime<Utc> },

    /// The whole upload session was torn down
    Cleared { at: DateTime<Utc> },

    /// The delivery's asset list is stale and should be refetched
    AssetsInvalidated {
        delivery_id: DeliveryId,
        at: DateTime<Utc>,
    },

    /// All enqueued work finished (success or error)
    Drained { at: DateTime<Utc> },
}

impl UploadEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::StageChanged { .. } => "stage_changed",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Retried { .. } => "retried",
            Self::Removed { .. } => "removed",
            Self::Cleared { .. } => "cleared",
            Self::AssetsInvalidated { .. } => "assets_invalidated",
            Self::Drained { .. } => "drained",
        }
    }

    /// Get the item ID, for events scoped to a single item
    pub fn item_id(&self) -> Option<&ItemId> {
        match self {
            Self::Enqueued { item_id, .. } => Some(item_id),
            Self::StageChanged { item_id, .. } => Some(item_id),
            Self::Progress { item_id, .. } => Some(item_id),
            Self::Completed { item_id, .. } => Some(item_id),
            Self::Failed { item_id, .. } => Some(item_id),
            Self::Retried { item_id, .. } => Some(item_id),
            Self::Removed { item_id, .. } => Some(item_id),
            Self::Cleared { .. } | Self::AssetsInvalidated { .. } | Self::Drained { .. } => None,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. } => at,
            Self::StageChanged { at, .. } => at,
            Self::Progress { at, .. } => at,
            Self::Completed { at, .. } => at,
            Self::Failed { at, .. } => at,
            Self::Retried { at, .. } => at,
            Self::Removed { at, .. } => at,
            Self::Cleared { at } => at,
            Self::AssetsInvalidated { at, .. } => at,
            Self::Drained { at } => at,
        }
    }
}
