use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::providers::{
    parse_generation_response, require_prompt, GenerationOutput, ImageGenerator, ProviderError,
};
use crate::utils::http::send_for_json;

pub struct CraiyonClient {
    client: Client,
    endpoint: String,
}

impl CraiyonClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn request_body(prompt: &str) -> Value {
        json!({ "prompt": prompt })
    }
}

#[async_trait]
impl ImageGenerator for CraiyonClient {
    fn name(&self) -> &str {
        "craiyon"
    }

    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, ProviderError> {
        let prompt = require_prompt(prompt)?;
        debug!("POST {} prompt={:?}", self.endpoint, prompt);
        let request = self
            .client
            .post(&self.endpoint)
            .json(&Self::request_body(prompt));
        let body = send_for_json(request, "craiyon").await?;
        parse_generation_response(&body)
    }
}
