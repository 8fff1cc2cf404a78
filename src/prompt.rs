//! Custom-tag reply rendezvous.
//!
//! When a draft opens the custom-tag sub-flow, the bot posts a
//! force-reply prompt and waits, bounded by a timeout, for a reply
//! correlated to that prompt's message id. The wait is a one-shot
//! channel fulfilled by the inbound-message path, not a polling loop;
//! the waiting task holds no registry lock while suspended.
//!
//! Prompts are keyed per prompt-message-id, with at most one
//! outstanding prompt per draft. Dequeuing a draft cancels its
//! pending prompt by dropping the sender.

use std::collections::HashMap;
use teloxide::types::{ChatId, MessageId};
use tokio::sync::oneshot;
use tokio::sync::RwLock;

/// A reply that answered a custom-tag prompt.
#[derive(Debug)]
pub struct PromptReply {
    /// Chat the reply was posted in.
    pub chat: ChatId,
    /// The reply message itself, deleted after the tag is recorded.
    pub message: MessageId,
    /// Reply text, recorded verbatim as the custom tag.
    pub text: String,
}

struct Slot {
    draft: MessageId,
    tx: oneshot::Sender<PromptReply>,
}

/// Outstanding custom-tag prompts, keyed by prompt message id.
#[derive(Default)]
pub struct PendingPrompts {
    slots: RwLock<HashMap<MessageId, Slot>>,
}

impl PendingPrompts {
    /// Create an empty prompt table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt for a draft and return the receiver the
    /// opener waits on.
    ///
    /// Returns `None` when the draft already has an outstanding
    /// prompt; that prompt must resolve or time out first.
    pub async fn open(
        &self,
        prompt: MessageId,
        draft: MessageId,
    ) -> Option<oneshot::Receiver<PromptReply>> {
        let mut slots = self.slots.write().await;
        if slots.values().any(|slot| slot.draft == draft) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(prompt, Slot { draft, tx });
        Some(rx)
    }

    /// Deliver a reply to the prompt it answers.
    ///
    /// Returns `false` when no prompt is waiting under that id: the
    /// reply was not ours, or it arrived after the timeout already
    /// closed the slot — a no-op either way.
    pub async fn fulfill(&self, prompt: MessageId, reply: PromptReply) -> bool {
        let slot = self.slots.write().await.remove(&prompt);
        match slot {
            Some(slot) => slot.tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Drop a prompt slot after its wait timed out.
    pub async fn close(&self, prompt: MessageId) {
        self.slots.write().await.remove(&prompt);
    }

    /// Cancel any outstanding prompt for a draft (the draft was
    /// dequeued). Dropping the sender wakes the waiting task with a
    /// closed-channel error.
    pub async fn cancel_for_draft(&self, draft: MessageId) {
        self.slots
            .write()
            .await
            .retain(|_, slot| slot.draft != draft);
    }

    /// Whether a draft currently has an outstanding prompt.
    pub async fn is_open_for(&self, draft: MessageId) -> bool {
        self.slots
            .read()
            .await
            .values()
            .any(|slot| slot.draft == draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(message: i32, text: &str) -> PromptReply {
        PromptReply {
            chat: ChatId(1),
            message: MessageId(message),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn fulfill_wakes_the_opener() {
        let prompts = PendingPrompts::new();
        let rx = prompts
            .open(MessageId(10), MessageId(1))
            .await
            .expect("first prompt opens");

        assert!(prompts.fulfill(MessageId(10), reply(11, "sports")).await);
        let got = rx.await.expect("reply delivered");
        assert_eq!(got.text, "sports");
        assert_eq!(got.message, MessageId(11));
    }

    #[tokio::test]
    async fn second_prompt_for_same_draft_is_refused() {
        let prompts = PendingPrompts::new();
        let _rx = prompts
            .open(MessageId(10), MessageId(1))
            .await
            .expect("first prompt opens");
        assert!(prompts.open(MessageId(12), MessageId(1)).await.is_none());
        // A different draft may still open one.
        assert!(prompts.open(MessageId(13), MessageId(2)).await.is_some());
    }

    #[tokio::test]
    async fn fulfill_after_close_is_noop() {
        let prompts = PendingPrompts::new();
        let _rx = prompts
            .open(MessageId(10), MessageId(1))
            .await
            .expect("prompt opens");
        prompts.close(MessageId(10)).await;
        assert!(!prompts.fulfill(MessageId(10), reply(11, "late")).await);
    }

    #[tokio::test]
    async fn cancel_for_draft_closes_the_channel() {
        let prompts = PendingPrompts::new();
        let rx = prompts
            .open(MessageId(10), MessageId(1))
            .await
            .expect("prompt opens");
        prompts.cancel_for_draft(MessageId(1)).await;
        assert!(rx.await.is_err());
        assert!(!prompts.is_open_for(MessageId(1)).await);
    }
}
