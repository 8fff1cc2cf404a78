//! Button-press state machine for draft selection.
//!
//! Each callback event carries an opaque data token; [`CallbackAction`]
//! is its parsed form. Handlers start with an explicit ensure-queued
//! guard (a button press on an unqueued message lazily creates its
//! draft from the resolved URL), mutate the draft through the registry
//! so every toggle is linearized, and re-render the keyboard. A
//! "markup not modified" render conflict is swallowed; any other
//! render failure is logged and the keyboard is left stale.

use crate::bot::views;
use crate::bot::BotContext;
use crate::gateway::GatewayError;
use crate::prompt::PromptReply;
use crate::resolver;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{CallbackQuery, ChatId, InlineKeyboardMarkup, Message, MessageId};
use tracing::{debug, error, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Callback data encoding
// ─────────────────────────────────────────────────────────────────────────────

const DATA_SELECT: &str = "select";
const DATA_PUSH: &str = "push";
const DATA_RETURN: &str = "return";
const PREFIX_TAG: &str = "tag:";
const PREFIX_TARGET: &str = "target:";
const TOKEN_SUB: &str = "sub";
const TOKEN_CUSTOM: &str = "custom";

/// A parsed button-press event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Toggle queue membership of the message.
    Select,
    /// Dispatch the draft and dequeue it.
    Push,
    /// Navigate back to the idle view.
    Return,
    /// Toggle a tag catalog index.
    TagToggle(usize),
    /// Open the custom-tag reply prompt.
    TagCustomOpen,
    /// Remove the i-th custom tag.
    TagCustomRemove(usize),
    /// Navigate to the tag sub-view.
    TagSub,
    /// Toggle a target catalog index.
    TargetToggle(usize),
    /// Navigate to the target sub-view.
    TargetSub,
}

impl CallbackAction {
    /// Encode as the callback-data token stored on a button.
    #[must_use]
    pub fn data(&self) -> String {
        match self {
            Self::Select => DATA_SELECT.to_string(),
            Self::Push => DATA_PUSH.to_string(),
            Self::Return => DATA_RETURN.to_string(),
            Self::TagToggle(i) => format!("{PREFIX_TAG}{i}"),
            Self::TagCustomOpen => format!("{PREFIX_TAG}{TOKEN_CUSTOM}"),
            Self::TagCustomRemove(i) => format!("{PREFIX_TAG}{TOKEN_CUSTOM}:{i}"),
            Self::TagSub => format!("{PREFIX_TAG}{TOKEN_SUB}"),
            Self::TargetToggle(i) => format!("{PREFIX_TARGET}{i}"),
            Self::TargetSub => format!("{PREFIX_TARGET}{TOKEN_SUB}"),
        }
    }

    /// Parse a callback-data token. Unknown tokens yield `None`.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            DATA_SELECT => return Some(Self::Select),
            DATA_PUSH => return Some(Self::Push),
            DATA_RETURN => return Some(Self::Return),
            _ => {}
        }
        if let Some(rest) = data.strip_prefix(PREFIX_TAG) {
            if rest == TOKEN_SUB {
                return Some(Self::TagSub);
            }
            if rest == TOKEN_CUSTOM {
                return Some(Self::TagCustomOpen);
            }
            if let Some(index) = rest.strip_prefix("custom:") {
                return index.parse().ok().map(Self::TagCustomRemove);
            }
            return rest.parse().ok().map(Self::TagToggle);
        }
        if let Some(rest) = data.strip_prefix(PREFIX_TARGET) {
            if rest == TOKEN_SUB {
                return Some(Self::TargetSub);
            }
            return rest.parse().ok().map(Self::TargetToggle);
        }
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for all callback-query events.
///
/// # Errors
///
/// Returns an error only for failures worth surfacing to the outer
/// logging wrapper; render conflicts are handled internally.
pub async fn handle_callback(q: CallbackQuery, ctx: Arc<BotContext>) -> anyhow::Result<()> {
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(action) = CallbackAction::parse(data) else {
        warn!(data, "unrecognized callback data");
        return Ok(());
    };
    let Some(message) = q.message.as_ref().and_then(|m| m.regular_message()) else {
        debug!(data, "callback without an accessible message");
        return Ok(());
    };
    let message = message.clone();

    let notice = matches!(action, CallbackAction::Push)
        .then(|| format!("Pushing message {}", message.id.0));
    if let Err(e) = ctx.gateway.ack_callback(&q.id.0, notice.as_deref()).await {
        debug!(error = %e, "failed to answer callback query");
    }

    let username = q.from.username.clone();
    apply(action, &message, username, &ctx).await;
    Ok(())
}

async fn apply(
    action: CallbackAction,
    message: &Message,
    username: Option<String>,
    ctx: &Arc<BotContext>,
) {
    let chat = message.chat.id;
    let id = message.id;

    match action {
        CallbackAction::Select => {
            if ctx.queue.remove(id).await.is_some() {
                ctx.prompts.cancel_for_draft(id).await;
                render(ctx, chat, id, views::main_markup(false)).await;
            } else {
                ensure_queued(ctx, message).await;
                render(ctx, chat, id, views::main_markup(true)).await;
            }
        }
        CallbackAction::Return => {
            ensure_queued(ctx, message).await;
            render(ctx, chat, id, views::main_markup(true)).await;
        }
        CallbackAction::TagSub => {
            ensure_queued(ctx, message).await;
            render_tags(ctx, chat, id).await;
        }
        CallbackAction::TagToggle(index) => {
            ensure_queued(ctx, message).await;
            if ctx.queue.toggle_tag(id, index).await.is_none() {
                error!(message_id = id.0, "tag toggle on a vanished draft");
            }
            render_tags(ctx, chat, id).await;
        }
        CallbackAction::TagCustomRemove(index) => {
            ensure_queued(ctx, message).await;
            if ctx.queue.remove_custom_tag(id, index).await.is_none() {
                debug!(message_id = id.0, index, "stale custom-tag removal");
            }
            render_tags(ctx, chat, id).await;
        }
        CallbackAction::TagCustomOpen => {
            ensure_queued(ctx, message).await;
            spawn_custom_tag_prompt(Arc::clone(ctx), chat, id, username);
        }
        CallbackAction::TargetSub => {
            ensure_queued(ctx, message).await;
            render_targets(ctx, chat, id).await;
        }
        CallbackAction::TargetToggle(index) => {
            ensure_queued(ctx, message).await;
            if ctx.queue.toggle_target(id, index).await.is_none() {
                error!(message_id = id.0, "target toggle on a vanished draft");
            }
            render_targets(ctx, chat, id).await;
        }
        CallbackAction::Push => {
            ensure_queued(ctx, message).await;
            push_single(ctx, chat, id).await;
        }
    }
}

/// The explicit get-or-create guard every mutating handler starts
/// with: a button press on an unqueued message creates its draft from
/// the parent message's resolved URL.
async fn ensure_queued(ctx: &Arc<BotContext>, message: &Message) {
    let created = ctx
        .queue
        .ensure(message.id, || resolver::resolve_from_message(message))
        .await;
    if created {
        info!(message_id = message.id.0, "message queued");
    }
}

/// Read-and-remove, then fan out off the update handler.
async fn push_single(ctx: &Arc<BotContext>, chat: ChatId, id: MessageId) {
    let Some(draft) = ctx.queue.remove(id).await else {
        // Unreachable given the guard above; log and treat as no-op.
        error!(message_id = id.0, "push for a message not in the queue");
        render(ctx, chat, id, views::main_markup(false)).await;
        return;
    };
    ctx.prompts.cancel_for_draft(id).await;
    info!(message_id = id.0, url = %draft.source_url, "pushing single draft");
    render(ctx, chat, id, views::main_markup(false)).await;

    let engine = Arc::clone(&ctx.engine);
    tokio::spawn(async move {
        engine.dispatch(&draft, &[], &[]).await;
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Custom-tag sub-flow
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_custom_tag_prompt(
    ctx: Arc<BotContext>,
    chat: ChatId,
    draft: MessageId,
    username: Option<String>,
) {
    let timeout = Duration::from_secs(crate::config::CUSTOM_TAG_PROMPT_TIMEOUT_SECS);
    tokio::spawn(async move {
        if let Err(e) = run_custom_tag_prompt(&ctx, chat, draft, username, timeout).await {
            warn!(error = %e, message_id = draft.0, "custom-tag prompt failed");
        }
    });
}

/// Issue a force-reply prompt and wait for its correlated reply,
/// bounded by `timeout`. On a reply in time the text is appended to
/// the draft's custom tags and both prompt and reply are deleted; on
/// timeout or cancellation the draft is left unmodified and only the
/// prompt is deleted. No registry lock is held while waiting.
///
/// # Errors
///
/// Returns an error when the prompt message itself cannot be sent.
pub async fn run_custom_tag_prompt(
    ctx: &Arc<BotContext>,
    chat: ChatId,
    draft: MessageId,
    username: Option<String>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let text = match username {
        Some(name) => format!("@{name}\nReply with your custom tag:"),
        None => "Reply with your custom tag:".to_string(),
    };
    let prompt = ctx.gateway.prompt_reply(chat, draft, &text).await?;

    let Some(rx) = ctx.prompts.open(prompt, draft).await else {
        // One outstanding prompt per draft; drop the extra prompt.
        debug!(message_id = draft.0, "custom-tag prompt already open");
        delete_quietly(ctx, chat, prompt).await;
        return Ok(());
    };

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(reply)) => {
            if ctx.queue.append_custom_tag(draft, reply.text).await {
                render_tags(ctx, chat, draft).await;
            }
            delete_quietly(ctx, reply.chat, reply.message).await;
        }
        Ok(Err(_closed)) => {
            info!(message_id = draft.0, "custom-tag prompt cancelled");
        }
        Err(_elapsed) => {
            ctx.prompts.close(prompt).await;
            info!(
                message_id = draft.0,
                timeout_secs = timeout.as_secs(),
                "custom-tag prompt timed out"
            );
        }
    }

    delete_quietly(ctx, chat, prompt).await;
    Ok(())
}

/// Route an inbound reply to the prompt it answers, if any.
///
/// Replies that match no open prompt (including replies arriving
/// after a timeout) are ignored.
pub async fn handle_prompt_reply(ctx: &Arc<BotContext>, message: &Message) -> bool {
    let Some(replied) = message.reply_to_message() else {
        return false;
    };
    let Some(text) = message.text() else {
        return false;
    };
    ctx.prompts
        .fulfill(
            replied.id,
            PromptReply {
                chat: message.chat.id,
                message: message.id,
                text: text.to_string(),
            },
        )
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Re-render a keyboard. "Not modified" is expected and swallowed;
/// any other failure leaves the keyboard stale, which is acceptable
/// degradation.
pub async fn render(
    ctx: &Arc<BotContext>,
    chat: ChatId,
    id: MessageId,
    markup: InlineKeyboardMarkup,
) {
    match ctx.gateway.edit_markup(chat, id, markup).await {
        Ok(()) | Err(GatewayError::NotModified) => {}
        Err(e) => warn!(error = %e, message_id = id.0, "failed to edit reply markup"),
    }
}

async fn render_tags(ctx: &Arc<BotContext>, chat: ChatId, id: MessageId) {
    match ctx.queue.get(id).await {
        Some(draft) => render(ctx, chat, id, views::tag_markup(&draft, &ctx.catalog.tags)).await,
        None => render(ctx, chat, id, views::main_markup(false)).await,
    }
}

async fn render_targets(ctx: &Arc<BotContext>, chat: ChatId, id: MessageId) {
    match ctx.queue.get(id).await {
        Some(draft) => {
            render(
                ctx,
                chat,
                id,
                views::target_markup(&draft, &ctx.catalog.targets),
            )
            .await;
        }
        None => render(ctx, chat, id, views::main_markup(false)).await,
    }
}

async fn delete_quietly(ctx: &Arc<BotContext>, chat: ChatId, id: MessageId) {
    if let Err(e) = ctx.gateway.delete_message(chat, id).await {
        debug!(error = %e, message_id = id.0, "failed to delete message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_action() {
        let actions = [
            CallbackAction::Select,
            CallbackAction::Push,
            CallbackAction::Return,
            CallbackAction::TagToggle(3),
            CallbackAction::TagCustomOpen,
            CallbackAction::TagCustomRemove(1),
            CallbackAction::TagSub,
            CallbackAction::TargetToggle(0),
            CallbackAction::TargetSub,
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.data()), Some(action));
        }
    }

    #[test]
    fn bare_custom_opens_and_indexed_custom_removes() {
        assert_eq!(
            CallbackAction::parse("tag:custom"),
            Some(CallbackAction::TagCustomOpen)
        );
        assert_eq!(
            CallbackAction::parse("tag:custom:4"),
            Some(CallbackAction::TagCustomRemove(4))
        );
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("tag:"), None);
        assert_eq!(CallbackAction::parse("tag:custom:x"), None);
        assert_eq!(CallbackAction::parse("target:custom"), None);
        assert_eq!(CallbackAction::parse("selectx"), None);
    }
}
