use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::UploadResult;
use crate::types::SourceFile;

#[cfg(feature = "image-compression")]
use crate::error::UploadError;

/// Constraints for best-effort client-side size reduction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressionOptions {
    /// Target upper bound for the compressed payload, in megabytes
    pub max_size_mb: Option<f64>,

    /// Longest allowed edge; larger images are scaled down
    pub max_width_or_height: Option<u32>,

    /// Starting encode quality in 1..=100
    pub quality: Option<u8>,
}

impl CompressionOptions {
    /// Set the target payload size in megabytes
    pub fn with_max_size_mb(mut self, mb: f64) -> Self {
        self.max_size_mb = Some(mb);
        self
    }

    /// Set the longest allowed edge in pixels
    pub fn with_max_width_or_height(mut self, px: u32) -> Self {
        self.max_width_or_height = Some(px);
        self
    }

    /// Set the starting encode quality
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// Compression stage boundary
///
/// Implementations may fail; the pipeline recovers by falling back to
/// the original payload, so a compressor error is never an item error.
#[async_trait]
pub trait Compressor: Send + Sync + 'static {
    /// Check whether this compressor can shrink the given file
    fn is_compressible(&self, file: &SourceFile) -> bool;

    /// Produce a smaller payload under the given constraints
    async fn compress(
        &self,
        file: &SourceFile,
        options: &CompressionOptions,
    ) -> UploadResult<Bytes>;
}

/// Image compressor: decode, scale down to the edge limit, re-encode
/// as JPEG stepping quality down until under the byte budget
#[cfg(feature = "image-compression")]
pub struct ImageCompressor;

#[cfg(feature = "image-compression")]
impl ImageCompressor {
    pub fn new() -> Self {
        Self
    }

    const COMPRESSIBLE_TYPES: [&'static str; 5] = [
        "image/jpeg",
        "image/png",
        "image/webp",
        "image/bmp",
        "image/tiff",
    ];
}

#[cfg(feature = "image-compression")]
impl Default for ImageCompressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "image-compression")]
#[async_trait]
impl Compressor for ImageCompressor {
    fn is_compressible(&self, file: &SourceFile) -> bool {
        Self::COMPRESSIBLE_TYPES
            .iter()
            .any(|ty| file.content_type.eq_ignore_ascii_case(ty))
    }

    async fn compress(
        &self,
        file: &SourceFile,
        options: &CompressionOptions,
    ) -> UploadResult<Bytes> {
        let bytes = file.bytes.clone();
        let original_len = bytes.len();
        let options = options.clone();

        // Decoding and re-encoding are CPU-bound; keep them off the
        // async executor.
        let encoded = tokio::task::spawn_blocking(move || encode_under_budget(&bytes, &options))
            .await
            .map_err(|e| UploadError::compression(format!("compression task failed: {e}")))??;

        // Best effort only: never hand back a payload larger than the
        // original.
        if encoded.len() >= original_len {
            return Ok(file.bytes.clone());
        }
        Ok(encoded)
    }
}

#[cfg(feature = "image-compression")]
fn encode_under_budget(bytes: &Bytes, options: &CompressionOptions) -> UploadResult<Bytes> {
    use image::codecs::jpeg::JpegEncoder;
    use image::imageops::FilterType;
    use std::io::Cursor;

    let mut img = image::load_from_memory(bytes)
        .map_err(|e| UploadError::compression(format!("decode failed: {e}")))?;

    if let Some(max_edge) = options.max_width_or_height {
        let max_edge = max_edge.max(1);
        if img.width().max(img.height()) > max_edge {
            img = img.resize(max_edge, max_edge, FilterType::Lanczos3);
        }
    }

    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();

    let byte_cap = options
        .max_size_mb
        .map(|mb| (mb.max(0.0) * 1024.0 * 1024.0) as usize);
    let mut quality = options.quality.unwrap_or(80).clamp(10, 100);

    loop {
        let mut cursor = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| UploadError::compression(format!("encode failed: {e}")))?;
        let out = cursor.into_inner();

        match byte_cap {
            Some(cap) if out.len() > cap && quality > 30 => quality = quality.saturating_sub(10),
            _ => return Ok(Bytes::from(out)),
        }
    }
}
