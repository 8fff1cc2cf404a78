//! Messaging gateway abstraction over the Telegram API.
//!
//! Every outbound side effect of the bot goes through the [`Gateway`]
//! trait so the queue, state machine and dispatch engine never talk
//! to the transport directly. [`TelegramGateway`] is the production
//! implementation; tests substitute recording mocks.
//!
//! Outbound sends are retried with exponential backoff and jitter;
//! the "message is not modified" edit conflict is surfaced as its own
//! error variant so callers can swallow it silently.

use crate::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, ForceReply, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId,
    ParseMode, Recipient, ReplyParameters, True,
};
use teloxide::ApiError;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// A push destination: a numeric chat id or an @-prefixed channel
/// username. Bare usernames are normalized with a leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Normalize a raw target string.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        if raw.parse::<i64>().is_ok() || raw.starts_with('@') {
            Self(raw.to_string())
        } else {
            Self(format!("@{raw}"))
        }
    }

    /// The normalized target string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The Telegram recipient this target addresses.
    #[must_use]
    pub fn recipient(&self) -> Recipient {
        match self.0.parse::<i64>() {
            Ok(id) => Recipient::Id(ChatId(id)),
            Err(_) => Recipient::ChannelUsername(self.0.clone()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors surfaced by a [`Gateway`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Edit produced identical content; expected and non-fatal.
    #[error("message is not modified")]
    NotModified,
    /// Any other Telegram API failure.
    #[error("telegram api error: {0}")]
    Telegram(#[from] teloxide::RequestError),
    /// Transport-independent failure (used by test doubles).
    #[error("{0}")]
    Other(String),
}

fn classify_request_error(err: teloxide::RequestError) -> GatewayError {
    match err {
        teloxide::RequestError::Api(ApiError::MessageNotModified) => GatewayError::NotModified,
        other => GatewayError::Telegram(other),
    }
}

/// The transport seam: everything the bot does to the outside world.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a plain text message to a push target.
    async fn send_text(&self, target: &Target, text: &str) -> Result<(), GatewayError>;

    /// Send formatted text with an optional "Source" link button.
    async fn send_rich_text(
        &self,
        target: &Target,
        text: &str,
        parse_mode: ParseMode,
        source_url: Option<&str>,
    ) -> Result<(), GatewayError>;

    /// Send a photo with a formatted caption and an optional "Source"
    /// link button.
    async fn send_photo(
        &self,
        target: &Target,
        photo: Bytes,
        caption: &str,
        parse_mode: ParseMode,
        source_url: Option<&str>,
    ) -> Result<(), GatewayError>;

    /// Send a force-reply prompt below a message and return the
    /// prompt's message id for reply correlation.
    async fn prompt_reply(
        &self,
        chat: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, GatewayError>;

    /// Reply to a message in a chat (informational, no markup).
    async fn reply_text(
        &self,
        chat: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<(), GatewayError>;

    /// Replace the inline keyboard of an existing message.
    async fn edit_markup(
        &self,
        chat: ChatId,
        message: MessageId,
        markup: InlineKeyboardMarkup,
    ) -> Result<(), GatewayError>;

    /// Delete a message.
    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), GatewayError>;

    /// Acknowledge a callback query, optionally with a toast notice.
    async fn ack_callback(
        &self,
        callback_id: &str,
        notice: Option<&str>,
    ) -> Result<(), GatewayError>;
}

/// Retry an outbound operation with exponential backoff and jitter.
async fn with_retry<F, Fut, T>(operation: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

/// Production gateway backed by a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Wrap a bot instance.
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn source_markup(source_url: Option<&str>) -> Option<InlineKeyboardMarkup> {
        let url = reqwest::Url::parse(source_url?).ok()?;
        Some(InlineKeyboardMarkup::new([[InlineKeyboardButton::url(
            "Source", url,
        )]]))
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn send_text(&self, target: &Target, text: &str) -> Result<(), GatewayError> {
        with_retry(|| async {
            self.bot
                .send_message(target.recipient(), text)
                .await
                .map_err(classify_request_error)
        })
        .await?;
        Ok(())
    }

    async fn send_rich_text(
        &self,
        target: &Target,
        text: &str,
        parse_mode: ParseMode,
        source_url: Option<&str>,
    ) -> Result<(), GatewayError> {
        with_retry(|| async {
            let mut req = self
                .bot
                .send_message(target.recipient(), text)
                .parse_mode(parse_mode);
            if let Some(markup) = Self::source_markup(source_url) {
                req = req.reply_markup(markup);
            }
            req.await.map_err(classify_request_error)
        })
        .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        target: &Target,
        photo: Bytes,
        caption: &str,
        parse_mode: ParseMode,
        source_url: Option<&str>,
    ) -> Result<(), GatewayError> {
        with_retry(|| async {
            let mut req = self
                .bot
                .send_photo(target.recipient(), InputFile::memory(photo.clone()))
                .caption(caption)
                .parse_mode(parse_mode);
            if let Some(markup) = Self::source_markup(source_url) {
                req = req.reply_markup(markup);
            }
            req.await.map_err(classify_request_error)
        })
        .await?;
        Ok(())
    }

    async fn prompt_reply(
        &self,
        chat: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, GatewayError> {
        let force_reply = ForceReply {
            force_reply: True,
            input_field_placeholder: None,
            selective: true,
        };
        let message = with_retry(|| async {
            self.bot
                .send_message(chat, text)
                .reply_parameters(ReplyParameters::new(reply_to))
                .reply_markup(force_reply.clone())
                .disable_notification(true)
                .await
                .map_err(classify_request_error)
        })
        .await?;
        Ok(message.id)
    }

    async fn reply_text(
        &self,
        chat: ChatId,
        reply_to: MessageId,
        text: &str,
    ) -> Result<(), GatewayError> {
        with_retry(|| async {
            self.bot
                .send_message(chat, text)
                .reply_parameters(ReplyParameters::new(reply_to))
                .await
                .map_err(classify_request_error)
        })
        .await?;
        Ok(())
    }

    async fn edit_markup(
        &self,
        chat: ChatId,
        message: MessageId,
        markup: InlineKeyboardMarkup,
    ) -> Result<(), GatewayError> {
        self.bot
            .edit_message_reply_markup(chat, message)
            .reply_markup(markup)
            .await
            .map(|_| ())
            .map_err(classify_request_error)
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), GatewayError> {
        self.bot
            .delete_message(chat, message)
            .await
            .map(|_| ())
            .map_err(classify_request_error)
    }

    async fn ack_callback(
        &self,
        callback_id: &str,
        notice: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut req = self.bot
            .answer_callback_query(teloxide::types::CallbackQueryId(callback_id.to_owned()));
        if let Some(text) = notice {
            req = req.text(text);
        }
        req.await.map(|_| ()).map_err(classify_request_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_normalization() {
        assert_eq!(Target::new("name").as_str(), "@name");
        assert_eq!(Target::new("@name").as_str(), "@name");
        assert_eq!(Target::new("-100123").as_str(), "-100123");
        assert_eq!(Target::new(" padded ").as_str(), "@padded");
    }

    #[test]
    fn numeric_target_resolves_to_chat_id() {
        match Target::new("-100123").recipient() {
            Recipient::Id(id) => assert_eq!(id, ChatId(-100_123)),
            Recipient::ChannelUsername(_) => panic!("expected a chat id recipient"),
        }
    }

    #[test]
    fn username_target_resolves_to_channel() {
        match Target::new("somewhere").recipient() {
            Recipient::ChannelUsername(name) => assert_eq!(name, "@somewhere"),
            Recipient::Id(_) => panic!("expected a channel username recipient"),
        }
    }
}
