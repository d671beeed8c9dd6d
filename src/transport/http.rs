use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::debug;

use crate::error::{UploadError, UploadResult};
use crate::types::DeliveryId;

use super::{ConfirmRequest, InitRequest, ProgressSink, UploadTarget, UploadTransport};

/// Bytes handed to the presigned PUT per stream chunk
const TRANSFER_CHUNK_BYTES: usize = 64 * 1024;

/// HTTP transport: JSON init/confirm against the delivery API and a
/// streaming PUT to the presigned URL
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport against the given API base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a transport reusing an existing client (connection pool,
    /// default headers)
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    fn delivery_url(&self, delivery_id: &DeliveryId, suffix: &str) -> String {
        format!("{}/deliveries/{}/{}", self.base_url, delivery_id, suffix)
    }
}

/// Split a payload into chunks paired with the running byte count
/// after each chunk
fn chunk_with_offsets(payload: &Bytes, chunk_size: usize) -> Vec<(Bytes, usize)> {
    let mut chunks = Vec::with_capacity(payload.len() / chunk_size + 1);
    let mut offset = 0;
    while offset < payload.len() {
        let end = (offset + chunk_size).min(payload.len());
        chunks.push((payload.slice(offset..end), end));
        offset = end;
    }
    chunks
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn init_upload(
        &self,
        delivery_id: &DeliveryId,
        request: InitRequest,
    ) -> UploadResult<UploadTarget> {
        let url = self.delivery_url(delivery_id, "uploads");
        debug!(%url, filename = %request.filename, "requesting write target");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| UploadError::init(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::init(format!(
                "unexpected status {} from {url}",
                response.status()
            )));
        }

        response
            .json::<UploadTarget>()
            .await
            .map_err(|e| UploadError::init(format!("malformed init response: {e}")))
    }

    async fn transfer(
        &self,
        target: &UploadTarget,
        payload: Bytes,
        content_type: &str,
        on_progress: ProgressSink,
    ) -> UploadResult<()> {
        let total = payload.len().max(1);
        let chunks = chunk_with_offsets(&payload, TRANSFER_CHUNK_BYTES);
        debug!(
            upload_id = %target.upload_id,
            bytes = payload.len(),
            chunks = chunks.len(),
            "starting transfer"
        );

        // Progress is reported as each chunk is pulled into the request
        // body, which tracks bytes handed to the socket.
        let progress = on_progress.clone();
        let stream = futures::stream::iter(chunks.into_iter().map(move |(chunk, sent)| {
            progress(((sent * 100) / total) as u8);
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let response = self
            .client
            .put(&target.upload_url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, payload.len())
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| UploadError::transfer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::transfer(format!(
                "unexpected status {} from write target",
                response.status()
            )));
        }

        on_progress(100);
        Ok(())
    }

    async fn confirm_upload(
        &self,
        delivery_id: &DeliveryId,
        receipt: ConfirmRequest,
    ) -> UploadResult<()> {
        let url = self.delivery_url(delivery_id, "assets");
        debug!(%url, key = %receipt.key, "confirming upload");

        let response = self
            .client
            .post(&url)
            .json(&receipt)
            .send()
            .await
            .map_err(|e| UploadError::confirm(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::confirm(format!(
                "unexpected status {} from {url}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slashes_are_trimmed() {
        let transport = HttpTransport::new("https://api.example.test///");
        let url = transport.delivery_url(&DeliveryId::from("d1"), "uploads");
        assert_eq!(url, "https://api.example.test/deliveries/d1/uploads");
    }

    #[test]
    fn chunking_covers_the_whole_payload() {
        let payload = Bytes::from(vec![7u8; 150_000]);
        let chunks = chunk_with_offsets(&payload, TRANSFER_CHUNK_BYTES);

        assert_eq!(chunks.len(), 3);
        let total: usize = chunks.iter().map(|(c, _)| c.len()).sum();
        assert_eq!(total, payload.len());
        assert_eq!(chunks.last().unwrap().1, payload.len());
    }

    #[test]
    fn empty_payload_produces_no_chunks() {
        let chunks = chunk_with_offsets(&Bytes::new(), TRANSFER_CHUNK_BYTES);
        assert!(chunks.is_empty());
    }
}
