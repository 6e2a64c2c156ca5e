use std::sync::Arc;

use anyhow::Result;
use teloxide::Bot;

use crate::config::Config;
use crate::delivery::{
    BackoffSampler, ChatOutbox, RetryPolicy, Sleeper, TokioSleeper, UniformBackoff,
};
use crate::providers::{
    CraiyonClient, DeepAiUpscaler, DiffusionClient, FileResolver, HttpImageFetcher,
    ImageFetcher, ImageGenerator, ImageUpscaler,
};
use crate::utils::http::build_http_client;
use crate::utils::request_log::RequestLog;
use crate::utils::telegram::{TelegramFileResolver, TelegramOutbox};

/// Everything a command handler talks to. Cloned into every spawned handler
/// task; all members are shared handles.
#[derive(Clone)]
pub struct AppState {
    pub outbox: Arc<dyn ChatOutbox>,
    pub craiyon: Arc<dyn ImageGenerator>,
    pub diffusion: Arc<dyn ImageGenerator>,
    pub files: Arc<dyn FileResolver>,
    pub upscaler: Arc<dyn ImageUpscaler>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub request_log: Arc<RequestLog>,
    pub retry_policy: RetryPolicy,
    pub backoff: Arc<dyn BackoffSampler>,
    pub sleeper: Arc<dyn Sleeper>,
    pub seed_image_url_template: String,
}

impl AppState {
    pub fn from_config(bot: Bot, config: &Config) -> Result<Self> {
        let http = build_http_client(config.http_timeout)?;

        Ok(AppState {
            outbox: Arc::new(TelegramOutbox::new(bot.clone())),
            craiyon: Arc::new(CraiyonClient::new(http.clone(), &config.craiyon_endpoint)),
            diffusion: Arc::new(DiffusionClient::new(
                http.clone(),
                &config.diffusion_endpoint,
                config.diffusion_params.clone(),
            )),
            files: Arc::new(TelegramFileResolver::new(bot, &config.bot_token)),
            upscaler: Arc::new(DeepAiUpscaler::new(
                http.clone(),
                &config.deep_ai_upscale_endpoint,
                &config.deep_ai_api_key,
            )),
            fetcher: Arc::new(HttpImageFetcher::new(http)),
            request_log: Arc::new(RequestLog::new()),
            retry_policy: RetryPolicy {
                max_attempts: config.delivery_max_attempts,
                backoff_min_secs: config.delivery_backoff_min_seconds,
                backoff_max_secs: config.delivery_backoff_max_seconds,
            },
            backoff: Arc::new(UniformBackoff),
            sleeper: Arc::new(TokioSleeper),
            seed_image_url_template: config.seed_image_url_template.clone(),
        })
    }
}
