use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors produced by the upload pipeline and its collaborators
///
/// Only `Init`, `Transfer` and `Confirm` surface on items: the pipeline
/// catches them and moves the item to the error state. `Compression` is
/// recovered locally by falling back to the original payload.
#[derive(Error, Debug, Clone)]
pub enum UploadError {
    #[error("upload initiation failed: {0}")]
    Init(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("confirmation failed: {0}")]
    Confirm(String),

    #[error("compression failed: {0}")]
    Compression(String),
}

impl UploadError {
    /// Create an init-stage error
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    /// Create a transfer-stage error
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a confirm-stage error
    pub fn confirm(msg: impl Into<String>) -> Self {
        Self::Confirm(msg.into())
    }

    /// Create a compression-stage error
    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }

    /// Name of the pipeline stage this error belongs to
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Transfer(_) => "transfer",
            Self::Confirm(_) => "confirm",
            Self::Compression(_) => "compression",
        }
    }

    /// Check whether this error is recovered inside the pipeline
    /// rather than surfaced on the item
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Compression(_))
    }
}
