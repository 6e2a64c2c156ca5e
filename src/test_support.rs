use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::delivery::{
    BackoffSampler, ChatOutbox, PhotoPayload, ReplyTarget, RetryPolicy, Sleeper,
};
use crate::providers::{
    FileResolver, GenerationOutput, ImageFetcher, ImageGenerator, ImageUpscaler, ProviderError,
};
use crate::state::AppState;
use crate::utils::request_log::RequestLog;

#[derive(Default)]
pub struct FakeOutbox {
    fail_groups: usize,
    fail_group_attempts: Vec<usize>,
    fail_texts: bool,
    group_attempts: AtomicUsize,
    texts: Mutex<Vec<String>>,
    photos: Mutex<Vec<PhotoPayload>>,
    groups: Mutex<Vec<Vec<PhotoPayload>>>,
}

impl FakeOutbox {
    /// Fails the first `count` grouped deliveries.
    pub fn failing_groups(count: usize) -> Self {
        FakeOutbox {
            fail_groups: count,
            ..Default::default()
        }
    }

    /// Fails only the listed zero-based grouped-delivery attempts.
    pub fn failing_group_attempts(attempts: &[usize]) -> Self {
        FakeOutbox {
            fail_group_attempts: attempts.to_vec(),
            ..Default::default()
        }
    }

    pub fn failing_texts() -> Self {
        FakeOutbox {
            fail_texts: true,
            ..Default::default()
        }
    }

    pub fn group_attempts(&self) -> usize {
        self.group_attempts.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub fn photos(&self) -> Vec<PhotoPayload> {
        self.photos.lock().clone()
    }

    pub fn delivered_groups(&self) -> Vec<Vec<PhotoPayload>> {
        self.groups.lock().clone()
    }
}

#[async_trait]
impl ChatOutbox for FakeOutbox {
    async fn send_text(&self, _target: ReplyTarget, text: &str) -> Result<()> {
        if self.fail_texts {
            return Err(anyhow!("chat unavailable"));
        }
        self.texts.lock().push(text.to_string());
        Ok(())
    }

    async fn send_photo(&self, _target: ReplyTarget, photo: PhotoPayload) -> Result<()> {
        self.photos.lock().push(photo);
        Ok(())
    }

    async fn send_photo_group(&self, _target: ReplyTarget, photos: &[PhotoPayload]) -> Result<()> {
        let attempt = self.group_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_groups || self.fail_group_attempts.contains(&attempt) {
            return Err(anyhow!("timed out"));
        }
        self.groups.lock().push(photos.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

pub struct FixedBackoff(pub Duration);

impl BackoffSampler for FixedBackoff {
    fn sample(&self, _policy: &RetryPolicy) -> Duration {
        self.0
    }
}

pub struct FakeGenerator {
    result: Result<GenerationOutput, ProviderError>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn returning(result: Result<GenerationOutput, ProviderError>) -> Self {
        FakeGenerator {
            result,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, ProviderError> {
        self.prompts.lock().push(prompt.to_string());
        self.result.clone()
    }
}

/// Counts every network-facing call made through the upscale chain.
#[derive(Default)]
pub struct FakeNetwork {
    pub calls: AtomicUsize,
    pub fetched_urls: Mutex<Vec<String>>,
    pub fetch_bytes: Vec<u8>,
}

impl FakeNetwork {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileResolver for FakeNetwork {
    async fn download_url(&self, file_id: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://files.example/{file_id}.jpg"))
    }
}

#[async_trait]
impl ImageUpscaler for FakeNetwork {
    async fn upscale(&self, image_url: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{image_url}?upscaled"))
    }
}

#[async_trait]
impl ImageFetcher for FakeNetwork {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fetched_urls.lock().push(url.to_string());
        Ok(self.fetch_bytes.clone())
    }
}

pub struct Harness {
    pub outbox: Arc<FakeOutbox>,
    pub craiyon: Arc<FakeGenerator>,
    pub diffusion: Arc<FakeGenerator>,
    pub network: Arc<FakeNetwork>,
    pub sleeper: Arc<RecordingSleeper>,
    pub state: AppState,
}

impl Harness {
    pub fn new(outbox: FakeOutbox, generated: Result<GenerationOutput, ProviderError>) -> Self {
        let outbox = Arc::new(outbox);
        let craiyon = Arc::new(FakeGenerator::returning(generated.clone()));
        let diffusion = Arc::new(FakeGenerator::returning(generated));
        let network = Arc::new(FakeNetwork {
            fetch_bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
            ..Default::default()
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let state = AppState {
            outbox: outbox.clone(),
            craiyon: craiyon.clone(),
            diffusion: diffusion.clone(),
            files: network.clone(),
            upscaler: network.clone(),
            fetcher: network.clone(),
            request_log: Arc::new(RequestLog::new()),
            retry_policy: RetryPolicy::default(),
            backoff: Arc::new(FixedBackoff(Duration::from_secs(30))),
            sleeper: sleeper.clone(),
            seed_image_url_template: "https://img.example/results/seed{seed}.jpg".to_string(),
        };
        Harness {
            outbox,
            craiyon,
            diffusion,
            network,
            sleeper,
            state,
        }
    }
}
