use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use tracing::warn;

use crate::providers::{truncate_for_log, ImageFetcher, ProviderError};

const DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

#[derive(Debug, thiserror::Error)]
#[error("invalid base64 image payload: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// Line breaks and other whitespace inside the payload are ignored, the way
/// MIME base64 bodies are usually wrapped.
pub fn decode_image_base64(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = encoded
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    Ok(general_purpose::STANDARD.decode(compact)?)
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn photo_file_name(data: &[u8]) -> String {
    let extension = infer::get(data)
        .filter(|kind| kind.mime_type().starts_with("image/"))
        .map(|kind| kind.extension())
        .unwrap_or("jpg");
    format!("image.{extension}")
}

#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.client.get(url).send().await.map_err(|err| {
            warn!("Failed to fetch image {url}: {err}");
            ProviderError::from(err)
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Image download failed for {url} with status {}: {}",
                status,
                truncate_for_log(&body, DOWNLOAD_ERROR_BODY_LIMIT)
            );
            return Err(ProviderError::transient(format!(
                "image download returned {status}"
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::transient("image download returned no bytes"));
        }
        Ok(bytes.to_vec())
    }
}
