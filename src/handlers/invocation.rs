use teloxide::types::Message;

use crate::delivery::ReplyTarget;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepliedMessage {
    /// Largest available size of the replied-to photo, if it has one.
    pub photo_file_id: Option<String>,
}

/// One inbound command, detached from the Telegram update it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandInvocation {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub user_full_name: String,
    pub chat_id: i64,
    pub chat_name: String,
    pub message_id: i32,
    pub args: String,
    pub reply: Option<RepliedMessage>,
}

impl CommandInvocation {
    pub fn from_message(message: &Message, args: String) -> Self {
        let user = message.from.as_ref();
        let chat_name = message
            .chat
            .title()
            .or_else(|| message.chat.username())
            .or_else(|| message.chat.first_name())
            .unwrap_or_default()
            .to_string();

        let reply = message.reply_to_message().map(|replied| RepliedMessage {
            photo_file_id: replied
                .photo()
                .and_then(|sizes| sizes.last())
                .map(|photo| photo.file.id.0.clone()),
        });

        CommandInvocation {
            user_id: user.and_then(|u| i64::try_from(u.id.0).ok()),
            username: user.and_then(|u| u.username.clone()),
            user_full_name: user.map(|u| u.full_name()).unwrap_or_default(),
            chat_id: message.chat.id.0,
            chat_name,
            message_id: message.id.0,
            args,
            reply,
        }
    }

    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            chat_id: self.chat_id,
            reply_to: Some(self.message_id),
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        let trimmed = self.args.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub fn replied_photo(&self) -> Option<&str> {
        self.reply.as_ref()?.photo_file_id.as_deref()
    }
}
