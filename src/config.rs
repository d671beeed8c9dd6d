use crate::compress::CompressionOptions;

/// Configuration for the upload orchestrator
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Maximum number of simultaneously in-flight items
    pub max_concurrent: usize,

    /// Constraints handed to the compression stage
    pub compression: CompressionOptions,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            compression: CompressionOptions::default(),
        }
    }
}

impl UploaderConfig {
    /// Set the concurrency cap (clamped to at least 1)
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Set the compression constraints
    pub fn with_compression(mut self, compression: CompressionOptions) -> Self {
        self.compression = compression;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_concurrency_is_three() {
        assert_eq!(UploaderConfig::default().max_concurrent, 3);
    }

    #[test]
    fn max_concurrent_is_clamped() {
        let config = UploaderConfig::default().with_max_concurrent(0);
        assert_eq!(config.max_concurrent, 1);
    }
}
