use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, InputMedia, InputMediaPhoto, MessageId, ReplyParameters};
use tracing::warn;

use crate::delivery::{ChatOutbox, PhotoPayload, PhotoSource, ReplyTarget};
use crate::providers::media::photo_file_name;
use crate::providers::{FileResolver, ProviderError};
use crate::utils::http::build_http_client;

const TELEGRAM_FILE_BASE: &str = "https://api.telegram.org/file";

/// `Bot::new` carries its own client with a fixed request timeout; this one
/// shares the provider client settings, so uploads are unbounded unless
/// `HTTP_TIMEOUT_SECONDS` says otherwise.
pub fn build_bot(token: &str, timeout: Option<Duration>) -> reqwest::Result<Bot> {
    Ok(Bot::with_client(token, build_http_client(timeout)?))
}

fn to_input_file(source: &PhotoSource) -> InputFile {
    match source {
        PhotoSource::Bytes(bytes) => {
            InputFile::memory(bytes.clone()).file_name(photo_file_name(bytes))
        }
        PhotoSource::Url(url) => InputFile::url(url.clone()),
    }
}

fn reply_parameters(target: ReplyTarget) -> Option<ReplyParameters> {
    target
        .reply_to
        .map(|message_id| ReplyParameters::new(MessageId(message_id)))
}

pub struct TelegramOutbox {
    bot: Bot,
}

impl TelegramOutbox {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatOutbox for TelegramOutbox {
    async fn send_text(&self, target: ReplyTarget, text: &str) -> Result<()> {
        let mut request = self.bot.send_message(ChatId(target.chat_id), text.to_string());
        if let Some(params) = reply_parameters(target) {
            request = request.reply_parameters(params);
        }
        request.await?;
        Ok(())
    }

    async fn send_photo(&self, target: ReplyTarget, photo: PhotoPayload) -> Result<()> {
        let mut request = self
            .bot
            .send_photo(ChatId(target.chat_id), to_input_file(&photo.source));
        if let Some(caption) = photo.caption {
            request = request.caption(caption);
        }
        if let Some(params) = reply_parameters(target) {
            request = request.reply_parameters(params);
        }
        request.await?;
        Ok(())
    }

    async fn send_photo_group(&self, target: ReplyTarget, photos: &[PhotoPayload]) -> Result<()> {
        // sendMediaGroup needs at least two items.
        if let [photo] = photos {
            return self.send_photo(target, photo.clone()).await;
        }

        let mut media = Vec::with_capacity(photos.len());
        for photo in photos {
            let mut item = InputMediaPhoto::new(to_input_file(&photo.source));
            if let Some(caption) = &photo.caption {
                item = item.caption(caption.clone());
            }
            media.push(InputMedia::Photo(item));
        }

        let mut request = self.bot.send_media_group(ChatId(target.chat_id), media);
        if let Some(params) = reply_parameters(target) {
            request = request.reply_parameters(params);
        }
        request.await?;
        Ok(())
    }
}

pub struct TelegramFileResolver {
    bot: Bot,
    token: String,
}

impl TelegramFileResolver {
    pub fn new(bot: Bot, token: impl Into<String>) -> Self {
        Self {
            bot,
            token: token.into(),
        }
    }
}

pub fn file_download_url(token: &str, file_path: &str) -> String {
    format!("{TELEGRAM_FILE_BASE}/bot{token}/{file_path}")
}

#[async_trait]
impl FileResolver for TelegramFileResolver {
    async fn download_url(&self, file_id: &str) -> Result<String, ProviderError> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|err| {
                warn!("getFile failed for {file_id}: {err}");
                ProviderError::transient(format!("getFile failed: {err}"))
            })?;
        Ok(file_download_url(&self.token, &file.path))
    }
}
