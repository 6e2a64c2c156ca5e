pub mod retry;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

pub use retry::{
    deliver_with_retry, BackoffSampler, DeliveryOutcome, RetryPolicy, Sleeper, TokioSleeper,
    UniformBackoff,
};

/// Where a reply goes: the chat and, optionally, the message being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTarget {
    pub chat_id: i64,
    pub reply_to: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    Bytes(Vec<u8>),
    /// Parsed up front so a malformed link fails before any send attempt.
    Url(Url),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPayload {
    pub source: PhotoSource,
    pub caption: Option<String>,
}

/// Builds a grouped-photo batch where only the first image carries the
/// caption.
pub fn captioned_batch(images: Vec<Vec<u8>>, caption: &str) -> Vec<PhotoPayload> {
    images
        .into_iter()
        .enumerate()
        .map(|(index, bytes)| PhotoPayload {
            source: PhotoSource::Bytes(bytes),
            caption: (index == 0).then(|| caption.to_string()),
        })
        .collect()
}

#[async_trait]
pub trait ChatOutbox: Send + Sync {
    async fn send_text(&self, target: ReplyTarget, text: &str) -> Result<()>;

    async fn send_photo(&self, target: ReplyTarget, photo: PhotoPayload) -> Result<()>;

    async fn send_photo_group(&self, target: ReplyTarget, photos: &[PhotoPayload]) -> Result<()>;
}
