pub mod craiyon;
pub mod deepai;
pub mod diffusion;
pub mod media;

use async_trait::async_trait;
use serde_json::Value;

pub use craiyon::CraiyonClient;
pub use deepai::DeepAiUpscaler;
pub use diffusion::DiffusionClient;
pub use media::{decode_image_base64, DecodeError, HttpImageFetcher};

/// Outcome of a failed provider call. Validation failures happen before any
/// request is sent; everything else is transient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Validation(String),
    #[error("Image generation failed: {0}")]
    Transient(String),
}

impl ProviderError {
    pub fn transient(detail: impl std::fmt::Display) -> Self {
        ProviderError::Transient(detail.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transient(format!(
            "{err} (timeout={}, connect={}, status={:?})",
            err.is_timeout(),
            err.is_connect(),
            err.status()
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutput {
    Encoded(Vec<String>),
    Url(String),
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, ProviderError>;
}

#[async_trait]
pub trait FileResolver: Send + Sync {
    async fn download_url(&self, file_id: &str) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait ImageUpscaler: Send + Sync {
    /// Returns the URL of the upscaled image.
    async fn upscale(&self, image_url: &str) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

pub(crate) fn require_prompt(prompt: &str) -> Result<&str, ProviderError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Validation("Command needs a prompt.".to_string()));
    }
    Ok(trimmed)
}

/// Accepts either `{"images": [..base64..]}` or a single URL under
/// `output_url` / `url`.
pub fn parse_generation_response(body: &Value) -> Result<GenerationOutput, ProviderError> {
    if let Some(images) = body.get("images").and_then(|value| value.as_array()) {
        let encoded = images
            .iter()
            .filter_map(|value| value.as_str())
            .map(|value| value.to_string())
            .collect::<Vec<_>>();
        if encoded.is_empty() {
            return Err(ProviderError::transient("response contained no images"));
        }
        return Ok(GenerationOutput::Encoded(encoded));
    }

    for key in ["output_url", "url"] {
        if let Some(url) = body.get(key).and_then(|value| value.as_str()) {
            if !url.trim().is_empty() {
                return Ok(GenerationOutput::Url(url.to_string()));
            }
        }
    }

    Err(ProviderError::transient(
        "response has neither `images` nor an output URL",
    ))
}

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}
