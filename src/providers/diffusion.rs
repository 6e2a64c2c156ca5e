use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::DiffusionParams;
use crate::providers::{
    parse_generation_response, require_prompt, GenerationOutput, ImageGenerator, ProviderError,
};
use crate::utils::http::send_for_json;

/// Variant generator: same prompt-in/images-out contract, with a fixed set of
/// sampling parameters sent alongside every prompt.
pub struct DiffusionClient {
    client: Client,
    endpoint: String,
    params: DiffusionParams,
}

impl DiffusionClient {
    pub fn new(client: Client, endpoint: impl Into<String>, params: DiffusionParams) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            params,
        }
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        json!({
            "prompt": prompt,
            "aspect_ratio": self.params.aspect_ratio,
            "num_inference_steps": self.params.num_inference_steps,
            "guidance_scale": self.params.guidance_scale,
        })
    }
}

#[async_trait]
impl ImageGenerator for DiffusionClient {
    fn name(&self) -> &str {
        "diffusion"
    }

    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, ProviderError> {
        let prompt = require_prompt(prompt)?;
        let body = self.request_body(prompt);
        debug!("POST {} body={}", self.endpoint, body);
        let request = self.client.post(&self.endpoint).json(&body);
        let response = send_for_json(request, "diffusion").await?;
        parse_generation_response(&response)
    }
}
