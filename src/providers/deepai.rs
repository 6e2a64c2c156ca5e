use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::providers::{ImageUpscaler, ProviderError};
use crate::utils::http::send_for_json;

#[derive(Debug, Deserialize)]
struct DeepAiResponse {
    output_url: Option<String>,
}

pub struct DeepAiUpscaler {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl DeepAiUpscaler {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

fn extract_output_url(body: serde_json::Value) -> Result<String, ProviderError> {
    let parsed: DeepAiResponse = serde_json::from_value(body)
        .map_err(|err| ProviderError::transient(format!("deepai response: {err}")))?;
    parsed
        .output_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ProviderError::transient("deepai response has no output_url"))
}

#[async_trait]
impl ImageUpscaler for DeepAiUpscaler {
    async fn upscale(&self, image_url: &str) -> Result<String, ProviderError> {
        let request = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .form(&[("image", image_url)]);
        let body = send_for_json(request, "deepai").await?;
        extract_output_url(body)
    }
}
