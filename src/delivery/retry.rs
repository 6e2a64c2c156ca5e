use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use crate::delivery::{ChatOutbox, PhotoPayload, ReplyTarget};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 30;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 60;

/// Bounded attempt count with a flat random pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

pub trait BackoffSampler: Send + Sync {
    fn sample(&self, policy: &RetryPolicy) -> Duration;
}

/// Whole seconds drawn uniformly from the inclusive policy range.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformBackoff;

impl BackoffSampler for UniformBackoff {
    fn sample(&self, policy: &RetryPolicy) -> Duration {
        let low = policy.backoff_min_secs.min(policy.backoff_max_secs);
        let high = policy.backoff_min_secs.max(policy.backoff_max_secs);
        Duration::from_secs(rand::thread_rng().gen_range(low..=high))
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    GaveUp { attempts: u32 },
    Empty,
}

pub fn give_up_message(attempts: u32) -> String {
    format!("Couldn't deliver the images after {attempts} attempts. I'm very sorry.")
}

/// Telegram's limit on items in one grouped-photo message.
pub const MAX_GROUP_SIZE: usize = 10;

/// Sends one group until it lands or the attempt budget runs out. Returns the
/// attempts spent either way.
async fn deliver_group(
    outbox: &dyn ChatOutbox,
    target: ReplyTarget,
    group: &[PhotoPayload],
    policy: &RetryPolicy,
    backoff: &dyn BackoffSampler,
    sleeper: &dyn Sleeper,
    prompt: &str,
) -> Result<u32, u32> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match outbox.send_photo_group(target, group).await {
            Ok(()) => {
                info!(
                    "{prompt} - delivered {} image(s) (attempt {attempt}/{max_attempts})",
                    group.len()
                );
                return Ok(attempt);
            }
            Err(err) if attempt >= max_attempts => {
                warn!("{prompt} - delivery failed: {err}; giving up after {attempt} attempts");
                return Err(attempt);
            }
            Err(err) => {
                let delay = backoff.sample(policy);
                warn!(
                    "{prompt} - delivery failed: {err}; retrying in {}s (attempt {attempt}/{max_attempts})",
                    delay.as_secs()
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Batches larger than [`MAX_GROUP_SIZE`] go out as consecutive groups, each
/// with its own attempt budget. `Delivered` counts send calls across all
/// groups; `GaveUp` reports the attempts spent on the group that failed.
pub async fn deliver_with_retry(
    outbox: &dyn ChatOutbox,
    target: ReplyTarget,
    photos: &[PhotoPayload],
    policy: &RetryPolicy,
    backoff: &dyn BackoffSampler,
    sleeper: &dyn Sleeper,
    prompt: &str,
) -> DeliveryOutcome {
    if photos.is_empty() {
        warn!("{prompt} - nothing to deliver");
        return DeliveryOutcome::Empty;
    }

    let mut total_attempts = 0;
    for group in photos.chunks(MAX_GROUP_SIZE) {
        match deliver_group(outbox, target, group, policy, backoff, sleeper, prompt).await {
            Ok(attempts) => total_attempts += attempts,
            Err(attempts) => {
                if let Err(notify_err) = outbox.send_text(target, &give_up_message(attempts)).await
                {
                    warn!("{prompt} - failed to report delivery failure: {notify_err}");
                }
                return DeliveryOutcome::GaveUp { attempts };
            }
        }
    }
    DeliveryOutcome::Delivered {
        attempts: total_attempts,
    }
}
