use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Source payload handed to the orchestrator - immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Original filename
    pub name: String,

    /// MIME type of the payload
    pub content_type: String,

    /// Size of the original payload in bytes
    pub size_bytes: u64,

    /// The payload itself (not serialized)
    #[serde(skip, default)]
    pub bytes: Bytes,
}

impl SourceFile {
    /// Create a new source file from a payload
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        let size_bytes = bytes.len() as u64;
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size_bytes,
            bytes,
        }
    }
}
