//! Operator commands: `/start`, `/check`, `/push`.

use crate::bot::{callbacks, views, BotContext};
use crate::gateway::Target;
use std::sync::Arc;
use teloxide::types::Message;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

/// Commands accepted from watcher chats.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    /// Show usage.
    Start,
    /// List the queued drafts.
    Check,
    /// Push the entire queue; arguments are extra tags, `@`-prefixed
    /// arguments are extra targets.
    Push(String),
}

const USAGE: &str = "Send me a link (or a message containing one) and use the buttons to \
queue it, pick tags and targets, then push.\n\n\
/check — list queued messages\n\
/push [tags / @targets] — push the whole queue";

/// Handle one command message.
///
/// # Errors
///
/// Propagates gateway failures on the command's own reply; delivery
/// failures during a push are logged per target instead.
pub async fn handle_command(
    msg: Message,
    cmd: Command,
    ctx: Arc<BotContext>,
) -> anyhow::Result<()> {
    match cmd {
        Command::Start => {
            ctx.gateway.reply_text(msg.chat.id, msg.id, USAGE).await?;
        }
        Command::Check => check(&msg, &ctx).await?,
        Command::Push(args) => push_all(&msg, &args, &ctx).await?,
    }
    Ok(())
}

async fn check(msg: &Message, ctx: &Arc<BotContext>) -> anyhow::Result<()> {
    let entries = ctx.queue.snapshot().await;
    for (_, draft) in &entries {
        ctx.gateway
            .reply_text(msg.chat.id, msg.id, &draft.describe(&ctx.catalog))
            .await?;
    }
    let summary = match entries.len() {
        0 => "The push queue is empty".to_string(),
        1 => "There is 1 message in the push queue".to_string(),
        n => format!("There are {n} messages in the push queue"),
    };
    ctx.gateway.reply_text(msg.chat.id, msg.id, &summary).await?;
    Ok(())
}

/// Split `/push` arguments into extra tags and extra targets.
fn parse_push_args(args: &str) -> (Vec<String>, Vec<Target>) {
    let mut tags = Vec::new();
    let mut targets = Vec::new();
    for word in args.split_whitespace() {
        if let Some(name) = word.strip_prefix('@') {
            if !name.is_empty() {
                targets.push(Target::new(word));
            }
        } else {
            tags.push(word.trim_start_matches('#').to_string());
        }
    }
    (tags, targets)
}

async fn push_all(msg: &Message, args: &str, ctx: &Arc<BotContext>) -> anyhow::Result<()> {
    if ctx.queue.is_empty().await {
        ctx.gateway
            .reply_text(msg.chat.id, msg.id, "The push queue is empty")
            .await?;
        return Ok(());
    }

    let (tags, targets) = parse_push_args(args);
    ctx.gateway
        .reply_text(msg.chat.id, msg.id, "Pushing the whole queue…")
        .await?;

    let pushed = ctx.engine.dispatch_all(&ctx.queue, &targets, &tags).await;
    info!(count = pushed.len(), "queue pushed");

    // Collapse every pushed message's keyboard back to the idle view.
    for id in pushed {
        ctx.prompts.cancel_for_draft(id).await;
        callbacks::render(ctx, msg.chat.id, id, views::main_markup(false)).await;
    }
    Ok(())
}

/// Handle a fresh (non-command, non-reply) message from a watcher
/// chat: attach the idle keyboard so it can be queued with a tap.
pub async fn handle_message(msg: Message, ctx: Arc<BotContext>) -> anyhow::Result<()> {
    let queued = ctx.queue.contains(msg.id).await;
    if let Err(e) = ctx
        .gateway
        .edit_markup(msg.chat.id, msg.id, views::main_markup(queued))
        .await
    {
        warn!(error = %e, message_id = msg.id.0, "failed to attach keyboard");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_args_split_tags_and_targets() {
        let (tags, targets) = parse_push_args("breaking @extra #urgent");
        assert_eq!(tags, vec!["breaking", "urgent"]);
        assert_eq!(targets, vec![Target::new("@extra")]);
    }

    #[test]
    fn push_args_empty_input() {
        let (tags, targets) = parse_push_args("   ");
        assert!(tags.is_empty());
        assert!(targets.is_empty());
    }

    #[test]
    fn lone_at_sign_is_ignored() {
        let (tags, targets) = parse_push_args("@");
        assert!(tags.is_empty());
        assert!(targets.is_empty());
    }
}
