use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::delivery::{
    captioned_batch, deliver_with_retry, DeliveryOutcome, PhotoPayload, PhotoSource,
};
use crate::handlers::invocation::CommandInvocation;
use crate::providers::media::detect_mime_type;
use crate::providers::{
    decode_image_base64, DecodeError, GenerationOutput, ImageGenerator, ProviderError,
};
use crate::state::AppState;
use crate::utils::timing::{complete_command_timer, start_command_timer, CommandTimer};

pub const NEEDS_PROMPT_TEXT: &str = "Command needs a prompt.";
pub const GENERIC_FAILURE_TEXT: &str = "Error happened. I'm very sorry.";
pub const REPLY_TO_IMAGE_TEXT: &str = "Reply to an image, please.";
pub const INCORRECT_NUMBER_TEXT: &str = "Incorrect number.";
pub const MAX_RANDOM_SEED: u32 = 99_999;

#[derive(Debug, thiserror::Error)]
enum RelayError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    Craiyon,
    Diffusion,
}

impl GeneratorKind {
    pub fn command(self) -> &'static str {
        match self {
            GeneratorKind::Craiyon => "generate",
            GeneratorKind::Diffusion => "diffuse",
        }
    }

    fn client(self, state: &AppState) -> &dyn ImageGenerator {
        match self {
            GeneratorKind::Craiyon => state.craiyon.as_ref(),
            GeneratorKind::Diffusion => state.diffusion.as_ref(),
        }
    }
}

pub async fn start_handler(state: &AppState, invocation: &CommandInvocation) -> Result<()> {
    state
        .outbox
        .send_text(invocation.reply_target(), "Hi. This command does NOTHING.")
        .await
}

pub async fn help_handler(state: &AppState, invocation: &CommandInvocation) -> Result<()> {
    let help_text = "\
/generate <prompt> - Generate images with Craiyon
/diffuse <prompt> - Generate images with the diffusion model
/waifu2x - Upscale a photo (send as a reply to the photo)
/anime - Fetch an anime portrait from a random seed
/animeseed <number> - Fetch the anime portrait for a given seed
/help - Show this message";

    state
        .outbox
        .send_text(invocation.reply_target(), help_text)
        .await
}

async fn generated_images(
    state: &AppState,
    generator: &dyn ImageGenerator,
    prompt: &str,
) -> Result<Vec<Vec<u8>>, RelayError> {
    match generator.generate(prompt).await? {
        GenerationOutput::Encoded(encoded) => {
            let mut images = Vec::with_capacity(encoded.len());
            for payload in &encoded {
                let bytes = decode_image_base64(payload)?;
                debug!(
                    "Decoded {} bytes ({:?}) from {}",
                    bytes.len(),
                    detect_mime_type(&bytes),
                    generator.name()
                );
                images.push(bytes);
            }
            Ok(images)
        }
        GenerationOutput::Url(url) => Ok(vec![state.fetcher.fetch(&url).await?]),
    }
}

fn record_delivery(timer: &mut CommandTimer, outcome: DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Delivered { attempts } => {
            complete_command_timer(timer, "success", Some(format!("attempts={attempts}")))
        }
        DeliveryOutcome::GaveUp { attempts } => complete_command_timer(
            timer,
            "delivery_failed",
            Some(format!("attempts={attempts}")),
        ),
        DeliveryOutcome::Empty => complete_command_timer(timer, "empty", None),
    }
}

async fn report_failure(
    state: &AppState,
    invocation: &CommandInvocation,
    timer: &mut CommandTimer,
    err: RelayError,
) -> Result<()> {
    let target = invocation.reply_target();
    match err {
        RelayError::Provider(ProviderError::Validation(message)) => {
            complete_command_timer(timer, "validation_error", Some(message.clone()));
            state.outbox.send_text(target, &message).await
        }
        other => {
            error!("{other}");
            complete_command_timer(timer, "error", Some(other.to_string()));
            state.outbox.send_text(target, GENERIC_FAILURE_TEXT).await
        }
    }
}

pub async fn generate_handler(
    state: AppState,
    invocation: CommandInvocation,
    kind: GeneratorKind,
) -> Result<()> {
    let mut timer = start_command_timer(kind.command(), &invocation);
    let target = invocation.reply_target();

    let Some(prompt) = invocation.prompt() else {
        complete_command_timer(&mut timer, "validation_error", Some("missing prompt".into()));
        return state.outbox.send_text(target, NEEDS_PROMPT_TEXT).await;
    };

    let generator = kind.client(&state);
    info!(
        chat = %invocation.chat_name,
        user = %invocation.user_full_name,
        provider = generator.name(),
        "Generation request: {prompt}"
    );

    let counts = state.request_log.record_and_count(Utc::now());
    debug!("Request log holds {} entries", state.request_log.len());
    let acknowledgment = format!(
        "Generating:\n\"{prompt}\"\nPlease wait...\n\n{}",
        counts.render()
    );
    if let Err(err) = state.outbox.send_text(target, &acknowledgment).await {
        complete_command_timer(&mut timer, "error", Some(format!("acknowledgment: {err}")));
        return Err(err);
    }

    let images = match generated_images(&state, generator, prompt).await {
        Ok(images) => images,
        Err(err) => return report_failure(&state, &invocation, &mut timer, err).await,
    };

    let photos = captioned_batch(images, prompt);
    let outcome = deliver_with_retry(
        state.outbox.as_ref(),
        target,
        &photos,
        &state.retry_policy,
        state.backoff.as_ref(),
        state.sleeper.as_ref(),
        prompt,
    )
    .await;
    record_delivery(&mut timer, outcome);
    Ok(())
}

async fn upscaled_image(state: &AppState, file_id: &str) -> Result<Vec<u8>, RelayError> {
    let source_url = state.files.download_url(file_id).await?;
    debug!("Resolved photo {file_id} for upscaling");
    let output_url = state.upscaler.upscale(&source_url).await?;
    info!("Upscaled image available at {output_url}");
    Ok(state.fetcher.fetch(&output_url).await?)
}

pub async fn waifu2x_handler(state: AppState, invocation: CommandInvocation) -> Result<()> {
    let mut timer = start_command_timer("waifu2x", &invocation);
    let target = invocation.reply_target();

    let Some(file_id) = invocation.replied_photo() else {
        complete_command_timer(&mut timer, "validation_error", Some("no photo".into()));
        return state.outbox.send_text(target, REPLY_TO_IMAGE_TEXT).await;
    };

    let image = match upscaled_image(&state, file_id).await {
        Ok(image) => image,
        Err(err) => return report_failure(&state, &invocation, &mut timer, err).await,
    };

    let photos = [PhotoPayload {
        source: PhotoSource::Bytes(image),
        caption: None,
    }];
    let outcome = deliver_with_retry(
        state.outbox.as_ref(),
        target,
        &photos,
        &state.retry_policy,
        state.backoff.as_ref(),
        state.sleeper.as_ref(),
        "waifu2x",
    )
    .await;
    record_delivery(&mut timer, outcome);
    Ok(())
}

/// Blank input means "pick one at random". No upper bound is enforced on
/// explicit seeds.
pub fn parse_seed(arg: &str) -> Result<Option<u32>, ProviderError> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| ProviderError::Validation(INCORRECT_NUMBER_TEXT.to_string()))
}

fn random_seed() -> u32 {
    rand::thread_rng().gen_range(0..=MAX_RANDOM_SEED)
}

pub fn format_seed(seed: u32) -> String {
    format!("{seed:05}")
}

pub fn seed_image_url(template: &str, seed: u32) -> String {
    template.replace("{seed}", &format_seed(seed))
}

pub async fn seed_image_handler(
    state: AppState,
    invocation: CommandInvocation,
    require_seed: bool,
) -> Result<()> {
    let command = if require_seed { "animeseed" } else { "anime" };
    let mut timer = start_command_timer(command, &invocation);
    let target = invocation.reply_target();

    let seed = match parse_seed(&invocation.args) {
        Ok(Some(seed)) => seed,
        Ok(None) if !require_seed => random_seed(),
        Ok(None) | Err(_) => {
            complete_command_timer(&mut timer, "validation_error", Some(invocation.args.clone()));
            return state.outbox.send_text(target, INCORRECT_NUMBER_TEXT).await;
        }
    };

    let url = match Url::parse(&seed_image_url(&state.seed_image_url_template, seed)) {
        Ok(url) => url,
        Err(err) => {
            error!("Seed image URL for {seed} is invalid: {err}");
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            return state.outbox.send_text(target, GENERIC_FAILURE_TEXT).await;
        }
    };
    let photo = PhotoPayload {
        source: PhotoSource::Url(url.clone()),
        caption: Some(format_seed(seed)),
    };
    if let Err(err) = state.outbox.send_photo(target, photo).await {
        warn!("Failed to send seed image {url}: {err}");
        complete_command_timer(&mut timer, "error", Some(err.to_string()));
        return state.outbox.send_text(target, GENERIC_FAILURE_TEXT).await;
    }

    complete_command_timer(&mut timer, "success", Some(format!("seed={seed}")));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use base64::{engine::general_purpose, Engine as _};

    use super::*;
    use crate::delivery::retry::give_up_message;
    use crate::handlers::invocation::RepliedMessage;
    use crate::test_support::{FakeOutbox, Harness};

    fn invocation(args: &str, reply: Option<RepliedMessage>) -> CommandInvocation {
        CommandInvocation {
            user_id: Some(5),
            username: Some("tester".to_string()),
            user_full_name: "Test User".to_string(),
            chat_id: -100,
            chat_name: "Test Chat".to_string(),
            message_id: 77,
            args: args.to_string(),
            reply,
        }
    }

    fn encoded(images: &[&str]) -> Result<GenerationOutput, ProviderError> {
        Ok(GenerationOutput::Encoded(
            images
                .iter()
                .map(|image| general_purpose::STANDARD.encode(image.as_bytes()))
                .collect(),
        ))
    }

    #[tokio::test]
    async fn empty_prompt_short_circuits_before_generation() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["img"]));

        generate_handler(harness.state.clone(), invocation("   ", None), GeneratorKind::Craiyon)
            .await
            .unwrap();

        assert_eq!(harness.outbox.texts(), vec![NEEDS_PROMPT_TEXT.to_string()]);
        assert!(harness.craiyon.prompts().is_empty());
        assert_eq!(harness.state.request_log.len(), 0);
        assert_eq!(harness.outbox.group_attempts(), 0);
    }

    #[tokio::test]
    async fn diffuse_sends_one_captioned_group() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["first", "second"]));

        generate_handler(
            harness.state.clone(),
            invocation("a cat", None),
            GeneratorKind::Diffusion,
        )
        .await
        .unwrap();

        assert_eq!(harness.diffusion.prompts(), vec!["a cat".to_string()]);
        assert!(harness.craiyon.prompts().is_empty());

        let groups = harness.outbox.delivered_groups();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].caption.as_deref(), Some("a cat"));
        assert_eq!(group[0].source, PhotoSource::Bytes(b"first".to_vec()));
        assert_eq!(group[1].caption, None);
        assert_eq!(group[1].source, PhotoSource::Bytes(b"second".to_vec()));

        let texts = harness.outbox.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Generating:\n\"a cat\"\nPlease wait..."));
        assert!(texts[0].contains("1min: 1"));
    }

    #[tokio::test]
    async fn transient_failure_collapses_to_generic_message() {
        let harness = Harness::new(
            FakeOutbox::default(),
            Err(ProviderError::transient("connection reset")),
        );

        generate_handler(harness.state.clone(), invocation("sunset", None), GeneratorKind::Craiyon)
            .await
            .unwrap();

        let texts = harness.outbox.texts();
        assert_eq!(texts.last().map(String::as_str), Some(GENERIC_FAILURE_TEXT));
        assert_eq!(harness.outbox.group_attempts(), 0);
    }

    #[tokio::test]
    async fn provider_validation_message_reaches_the_user() {
        let harness = Harness::new(
            FakeOutbox::default(),
            Err(ProviderError::Validation("Prompt rejected.".to_string())),
        );

        generate_handler(harness.state.clone(), invocation("sunset", None), GeneratorKind::Craiyon)
            .await
            .unwrap();

        assert_eq!(
            harness.outbox.texts().last().map(String::as_str),
            Some("Prompt rejected.")
        );
    }

    #[tokio::test]
    async fn undecodable_payload_never_enters_delivery() {
        let harness = Harness::new(
            FakeOutbox::default(),
            Ok(GenerationOutput::Encoded(vec!["%%%not-base64%%%".to_string()])),
        );

        generate_handler(harness.state.clone(), invocation("forest", None), GeneratorKind::Craiyon)
            .await
            .unwrap();

        assert_eq!(
            harness.outbox.texts().last().map(String::as_str),
            Some(GENERIC_FAILURE_TEXT)
        );
        assert_eq!(harness.outbox.group_attempts(), 0);
        assert!(harness.sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn url_output_is_downloaded_before_delivery() {
        let harness = Harness::new(
            FakeOutbox::default(),
            Ok(GenerationOutput::Url("https://cdn.example/out.png".to_string())),
        );

        generate_handler(harness.state.clone(), invocation("robot", None), GeneratorKind::Diffusion)
            .await
            .unwrap();

        assert_eq!(
            *harness.network.fetched_urls.lock(),
            vec!["https://cdn.example/out.png".to_string()]
        );
        let groups = harness.outbox.delivered_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0][0].caption.as_deref(), Some("robot"));
    }

    #[tokio::test]
    async fn exhausted_delivery_reports_attempt_count() {
        let harness = Harness::new(FakeOutbox::failing_groups(usize::MAX), encoded(&["x"]));

        generate_handler(harness.state.clone(), invocation("rain", None), GeneratorKind::Craiyon)
            .await
            .unwrap();

        assert_eq!(harness.outbox.group_attempts(), 5);
        assert_eq!(harness.sleeper.sleeps(), vec![Duration::from_secs(30); 4]);
        assert_eq!(harness.outbox.texts().last(), Some(&give_up_message(5)));
    }

    #[tokio::test]
    async fn waifu2x_on_text_reply_makes_no_network_calls() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["x"]));

        waifu2x_handler(
            harness.state.clone(),
            invocation("", Some(RepliedMessage::default())),
        )
        .await
        .unwrap();
        waifu2x_handler(harness.state.clone(), invocation("", None))
            .await
            .unwrap();

        assert_eq!(harness.network.call_count(), 0);
        assert_eq!(
            harness.outbox.texts(),
            vec![REPLY_TO_IMAGE_TEXT.to_string(), REPLY_TO_IMAGE_TEXT.to_string()]
        );
    }

    #[tokio::test]
    async fn waifu2x_chains_resolve_upscale_and_fetch() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["x"]));
        let reply = RepliedMessage {
            photo_file_id: Some("photo-1".to_string()),
        };

        waifu2x_handler(harness.state.clone(), invocation("", Some(reply)))
            .await
            .unwrap();

        assert_eq!(harness.network.call_count(), 3);
        assert_eq!(
            *harness.network.fetched_urls.lock(),
            vec!["https://files.example/photo-1.jpg?upscaled".to_string()]
        );
        let groups = harness.outbox.delivered_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0][0].caption, None);
    }

    #[test]
    fn seed_is_zero_padded_into_template() {
        let url = seed_image_url("https://img.example/results/seed{seed}.jpg", 42);
        assert!(url.ends_with("seed00042.jpg"));
    }

    #[test]
    fn out_of_range_seed_is_not_clamped() {
        let seed = parse_seed("100000").unwrap().unwrap();
        assert_eq!(
            seed_image_url("https://img.example/seed{seed}.jpg", seed),
            "https://img.example/seed100000.jpg"
        );
    }

    #[test]
    fn non_numeric_seed_is_rejected() {
        assert!(matches!(parse_seed("abc"), Err(ProviderError::Validation(_))));
        assert!(matches!(parse_seed("-3"), Err(ProviderError::Validation(_))));
        assert_eq!(parse_seed(""), Ok(None));
    }

    #[tokio::test]
    async fn explicit_seed_sends_url_photo_with_caption() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["x"]));

        seed_image_handler(harness.state.clone(), invocation("42", None), true)
            .await
            .unwrap();

        let photos = harness.outbox.photos();
        assert_eq!(photos.len(), 1);
        assert_eq!(
            photos[0].source,
            PhotoSource::Url(Url::parse("https://img.example/results/seed00042.jpg").unwrap())
        );
        assert_eq!(photos[0].caption.as_deref(), Some("00042"));
        assert_eq!(harness.network.call_count(), 0);
    }

    #[tokio::test]
    async fn random_seed_stays_in_range() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["x"]));

        for _ in 0..20 {
            seed_image_handler(harness.state.clone(), invocation("", None), false)
                .await
                .unwrap();
        }

        for photo in harness.outbox.photos() {
            let caption = photo.caption.unwrap();
            assert_eq!(caption.len(), 5);
            assert!(caption.parse::<u32>().unwrap() <= MAX_RANDOM_SEED);
        }
    }

    #[tokio::test]
    async fn bad_or_missing_seed_is_reported() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["x"]));

        seed_image_handler(harness.state.clone(), invocation("forty", None), true)
            .await
            .unwrap();
        seed_image_handler(harness.state.clone(), invocation("", None), true)
            .await
            .unwrap();

        assert_eq!(
            harness.outbox.texts(),
            vec![INCORRECT_NUMBER_TEXT.to_string(); 2]
        );
        assert!(harness.outbox.photos().is_empty());
    }

    #[tokio::test]
    async fn failed_acknowledgment_stops_before_generation() {
        let harness = Harness::new(FakeOutbox::failing_texts(), encoded(&["x"]));

        let result = generate_handler(
            harness.state.clone(),
            invocation("lighthouse", None),
            GeneratorKind::Craiyon,
        )
        .await;

        assert!(result.is_err());
        assert!(harness.craiyon.prompts().is_empty());
        assert_eq!(harness.outbox.group_attempts(), 0);
    }

    #[tokio::test]
    async fn malformed_seed_template_is_reported_without_sending() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["x"]));
        let mut state = harness.state.clone();
        state.seed_image_url_template = "seed{seed}.jpg".to_string();

        seed_image_handler(state, invocation("42", None), true)
            .await
            .unwrap();

        assert!(harness.outbox.photos().is_empty());
        assert_eq!(harness.outbox.texts(), vec![GENERIC_FAILURE_TEXT.to_string()]);
    }

    #[tokio::test]
    async fn help_lists_every_command() {
        let harness = Harness::new(FakeOutbox::default(), encoded(&["x"]));

        help_handler(&harness.state, &invocation("", None)).await.unwrap();

        let texts = harness.outbox.texts();
        assert_eq!(texts.len(), 1);
        for command in ["/generate", "/diffuse", "/waifu2x", "/anime", "/animeseed", "/help"] {
            assert!(texts[0].contains(command), "missing {command}");
        }
    }
}
