use std::env;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct DiffusionParams {
    pub aspect_ratio: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub deep_ai_api_key: String,
    pub log_level: String,
    pub craiyon_endpoint: String,
    pub diffusion_endpoint: String,
    pub diffusion_params: DiffusionParams,
    pub deep_ai_upscale_endpoint: String,
    pub seed_image_url_template: String,
    pub delivery_max_attempts: u32,
    pub delivery_backoff_min_seconds: u64,
    pub delivery_backoff_max_seconds: u64,
    pub http_timeout: Option<Duration>,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_required(name: &str) -> Result<String> {
    let value = env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(anyhow::anyhow!("{name} is required"));
    }
    Ok(value)
}

pub fn log_level_from_env() -> String {
    env_string("LOG_LEVEL", "info").to_lowercase()
}

/// Zero disables the timeout entirely.
pub fn timeout_from_seconds(seconds: u64) -> Option<Duration> {
    if seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(seconds))
    }
}

fn normalize_backoff_range(min: u64, max: u64) -> (u64, u64) {
    if min > max {
        warn!(
            "DELIVERY_BACKOFF_MIN_SECONDS ({}) exceeds DELIVERY_BACKOFF_MAX_SECONDS ({}); swapping.",
            min, max
        );
        return (max, min);
    }
    (min, max)
}

fn normalize_seed_template(value: String) -> String {
    if value.contains("{seed}") {
        return value;
    }
    warn!(
        "SEED_IMAGE_URL_TEMPLATE '{}' has no {{seed}} placeholder; appending one.",
        value
    );
    format!("{value}{{seed}}")
}

impl Config {
    pub fn load() -> Result<Self> {
        let bot_token = env_required("BOT_TOKEN")?;
        let deep_ai_api_key = env_required("DEEP_AI_API_KEY")?;

        let (backoff_min, backoff_max) = normalize_backoff_range(
            env_u64("DELIVERY_BACKOFF_MIN_SECONDS", 30),
            env_u64("DELIVERY_BACKOFF_MAX_SECONDS", 60),
        );

        Ok(Config {
            bot_token,
            deep_ai_api_key,
            log_level: log_level_from_env(),
            craiyon_endpoint: env_string("CRAIYON_ENDPOINT", "https://backend.craiyon.com/generate"),
            diffusion_endpoint: env_string(
                "DIFFUSION_ENDPOINT",
                "https://backend.craiyon.com/generate-diffusion",
            ),
            diffusion_params: DiffusionParams {
                aspect_ratio: env_string("DIFFUSION_ASPECT_RATIO", "1:1"),
                num_inference_steps: env_u32("DIFFUSION_STEPS", 50),
                guidance_scale: env_f32("DIFFUSION_GUIDANCE_SCALE", 7.5),
            },
            deep_ai_upscale_endpoint: env_string(
                "DEEP_AI_UPSCALE_ENDPOINT",
                "https://api.deepai.org/api/waifu2x",
            ),
            seed_image_url_template: normalize_seed_template(env_string(
                "SEED_IMAGE_URL_TEMPLATE",
                "https://thisanimedoesnotexist.ai/results/psi-1.0/seed{seed}.jpg",
            )),
            delivery_max_attempts: env_u32("DELIVERY_MAX_ATTEMPTS", 5).max(1),
            delivery_backoff_min_seconds: backoff_min,
            delivery_backoff_max_seconds: backoff_max,
            http_timeout: timeout_from_seconds(env_u64("HTTP_TIMEOUT_SECONDS", 0)),
        })
    }
}
