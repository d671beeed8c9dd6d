pub mod events;
pub mod file;
pub mod ids;
pub mod item;

pub use events::UploadEvent;
pub use file::SourceFile;
pub use ids::{DeliveryId, ItemId};
pub use item::{UploadItem, UploadStatus, UPLOAD_HEAD_PROGRESS};
