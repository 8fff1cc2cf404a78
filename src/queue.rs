//! Pending-push draft registry.
//!
//! The [`PushQueue`] is the single source of truth for "is this
//! message currently queued". It owns every live [`Draft`], keyed by
//! the originating message id, and linearizes all mutation under one
//! lock: concurrent button presses on the same draft cannot lose
//! updates, and [`PushQueue::snapshot_and_clear`] is an atomic swap
//! that neither loses nor duplicates entries racing with
//! [`PushQueue::ensure`].
//!
//! The registry is an owned instance passed by `Arc`, not a global.

use crate::config::Catalog;
use crate::gateway::Target;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use teloxide::types::MessageId;
use tokio::sync::RwLock;

/// One queued, not-yet-delivered post.
#[derive(Debug, Clone)]
pub struct Draft {
    /// Resolved canonical URL; immutable after creation.
    pub source_url: String,
    /// Selected indices into the tag catalog.
    pub tag_indices: BTreeSet<usize>,
    /// Selected indices into the target catalog.
    pub target_indices: BTreeSet<usize>,
    /// Freeform tags in insertion order; display order matters.
    pub custom_tags: Vec<String>,
    /// Freeform destinations (rare path).
    pub custom_targets: Vec<Target>,
}

impl Draft {
    /// Create an empty draft for a resolved URL.
    #[must_use]
    pub fn new(source_url: String) -> Self {
        Self {
            source_url,
            tag_indices: BTreeSet::new(),
            target_indices: BTreeSet::new(),
            custom_tags: Vec::new(),
            custom_targets: Vec::new(),
        }
    }

    /// Selected catalog tags in catalog order, then custom tags in
    /// insertion order.
    #[must_use]
    pub fn resolved_tags(&self, catalog: &Catalog) -> Vec<String> {
        self.tag_indices
            .iter()
            .filter_map(|&i| catalog.tags.get(i).cloned())
            .chain(self.custom_tags.iter().cloned())
            .collect()
    }

    /// Selected catalog targets in catalog order, then custom targets
    /// in insertion order.
    #[must_use]
    pub fn resolved_targets(&self, catalog: &Catalog) -> Vec<Target> {
        self.target_indices
            .iter()
            .filter_map(|&i| catalog.targets.get(i).cloned())
            .chain(self.custom_targets.iter().cloned())
            .collect()
    }

    /// Human-readable summary for the queue listing.
    #[must_use]
    pub fn describe(&self, catalog: &Catalog) -> String {
        format!(
            "url: {}\ntags: {}\ntargets: {}",
            self.source_url,
            self.resolved_tags(catalog).join(" "),
            self.resolved_targets(catalog)
                .iter()
                .map(Target::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        )
    }
}

/// Process-wide registry of live drafts, keyed by message id.
#[derive(Default)]
pub struct PushQueue {
    drafts: RwLock<HashMap<MessageId, Draft>>,
}

impl PushQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-then-insert: create a draft for `id` if absent.
    ///
    /// The resolver closure is only evaluated when a draft is
    /// actually created, so concurrent callers for the same id all
    /// observe the first caller's draft. Returns `true` if this call
    /// created the entry.
    pub async fn ensure<F>(&self, id: MessageId, resolve_url: F) -> bool
    where
        F: FnOnce() -> String,
    {
        let mut drafts = self.drafts.write().await;
        match drafts.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Draft::new(resolve_url()));
                true
            }
        }
    }

    /// Whether a draft exists for this message.
    pub async fn contains(&self, id: MessageId) -> bool {
        self.drafts.read().await.contains_key(&id)
    }

    /// Clone of the draft, if queued.
    pub async fn get(&self, id: MessageId) -> Option<Draft> {
        self.drafts.read().await.get(&id).cloned()
    }

    /// Remove and return the draft. Idempotent.
    pub async fn remove(&self, id: MessageId) -> Option<Draft> {
        self.drafts.write().await.remove(&id)
    }

    /// Toggle a tag catalog index; returns the new membership, or
    /// `None` when the message is not queued.
    pub async fn toggle_tag(&self, id: MessageId, index: usize) -> Option<bool> {
        let mut drafts = self.drafts.write().await;
        let draft = drafts.get_mut(&id)?;
        Some(toggle(&mut draft.tag_indices, index))
    }

    /// Toggle a target catalog index; returns the new membership, or
    /// `None` when the message is not queued.
    pub async fn toggle_target(&self, id: MessageId, index: usize) -> Option<bool> {
        let mut drafts = self.drafts.write().await;
        let draft = drafts.get_mut(&id)?;
        Some(toggle(&mut draft.target_indices, index))
    }

    /// Append a freeform tag; returns `false` when the message is no
    /// longer queued (a dequeue raced the custom-tag reply).
    pub async fn append_custom_tag(&self, id: MessageId, tag: String) -> bool {
        let mut drafts = self.drafts.write().await;
        match drafts.get_mut(&id) {
            Some(draft) => {
                draft.custom_tags.push(tag);
                true
            }
            None => false,
        }
    }

    /// Remove the custom tag at `index`, if both draft and index are
    /// still valid (the keyboard may be stale).
    pub async fn remove_custom_tag(&self, id: MessageId, index: usize) -> Option<String> {
        let mut drafts = self.drafts.write().await;
        let draft = drafts.get_mut(&id)?;
        if index < draft.custom_tags.len() {
            Some(draft.custom_tags.remove(index))
        } else {
            None
        }
    }

    /// Snapshot of the current queue, ordered by message id.
    pub async fn snapshot(&self) -> Vec<(MessageId, Draft)> {
        let drafts = self.drafts.read().await;
        let mut entries: Vec<_> = drafts.iter().map(|(id, d)| (*id, d.clone())).collect();
        entries.sort_by_key(|(id, _)| id.0);
        entries
    }

    /// Atomically take the whole queue and leave it empty.
    ///
    /// A linearizable swap: entries inserted concurrently land either
    /// in the returned map or in the emptied registry, never both.
    pub async fn snapshot_and_clear(&self) -> HashMap<MessageId, Draft> {
        let mut drafts = self.drafts.write().await;
        std::mem::take(&mut *drafts)
    }

    /// Number of queued drafts.
    pub async fn len(&self) -> usize {
        self.drafts.read().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.drafts.read().await.is_empty()
    }
}

fn toggle(set: &mut BTreeSet<usize>, index: usize) -> bool {
    if set.remove(&index) {
        false
    } else {
        set.insert(index);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Catalog, Settings};

    fn catalog() -> Catalog {
        Catalog::from_settings(&Settings {
            telegram_token: "dummy".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            targets: vec!["@one".to_string(), "@two".to_string()],
            watchers: Vec::new(),
        })
    }

    #[tokio::test]
    async fn ensure_is_create_if_absent() {
        let queue = PushQueue::new();
        let id = MessageId(7);

        assert!(queue.ensure(id, || "https://a".to_string()).await);
        assert!(!queue.ensure(id, || "https://b".to_string()).await);

        let draft = queue.get(id).await.expect("draft queued");
        assert_eq!(draft.source_url, "https://a");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let queue = PushQueue::new();
        let id = MessageId(1);
        queue.ensure(id, || String::from("u")).await;

        assert!(queue.remove(id).await.is_some());
        assert!(queue.remove(id).await.is_none());
        assert!(!queue.contains(id).await);
    }

    #[tokio::test]
    async fn toggle_on_unqueued_message_is_noop() {
        let queue = PushQueue::new();
        assert_eq!(queue.toggle_tag(MessageId(9), 0).await, None);
    }

    #[tokio::test]
    async fn custom_tag_removal_guards_stale_index() {
        let queue = PushQueue::new();
        let id = MessageId(2);
        queue.ensure(id, || String::from("u")).await;
        queue.append_custom_tag(id, "only".to_string()).await;

        assert_eq!(queue.remove_custom_tag(id, 5).await, None);
        assert_eq!(
            queue.remove_custom_tag(id, 0).await,
            Some("only".to_string())
        );
    }

    #[tokio::test]
    async fn resolved_tags_keep_catalog_then_custom_order() {
        let queue = PushQueue::new();
        let id = MessageId(3);
        queue.ensure(id, || String::from("u")).await;
        queue.toggle_tag(id, 1).await;
        queue.append_custom_tag(id, "z".to_string()).await;

        let draft = queue.get(id).await.expect("draft queued");
        assert_eq!(draft.resolved_tags(&catalog()), vec!["b", "z"]);
    }

    #[tokio::test]
    async fn describe_lists_url_tags_targets() {
        let queue = PushQueue::new();
        let id = MessageId(4);
        queue.ensure(id, || String::from("https://x")).await;
        queue.toggle_tag(id, 0).await;
        queue.toggle_target(id, 1).await;

        let draft = queue.get(id).await.expect("draft queued");
        assert_eq!(
            draft.describe(&catalog()),
            "url: https://x\ntags: a\ntargets: @two"
        );
    }
}
