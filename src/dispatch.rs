//! Draft fan-out engine.
//!
//! Resolves a draft's final tag and target sets, classifies the
//! source URL against the provider table, and delivers to every
//! target independently and concurrently. Delivery is at-least-once
//! best effort: a failed target is logged and skipped, it never
//! retries, never falls back to plain text, and never aborts the
//! other targets.

use crate::config::Catalog;
use crate::gateway::{Gateway, Target};
use crate::providers::{classify, ContentProvider};
use crate::queue::{Draft, PushQueue};
use futures_util::future::join_all;
use std::sync::Arc;
use teloxide::types::MessageId;
use tracing::{error, info};

/// The fan-out engine. Holds only read-only state (catalogs and the
/// provider table); drafts reach it already removed from the queue.
pub struct DispatchEngine {
    gateway: Arc<dyn Gateway>,
    catalog: Arc<Catalog>,
    providers: Vec<Arc<dyn ContentProvider>>,
}

/// Hashtag block appended to every delivery: empty when there are no
/// tags, otherwise two newlines then `#tag`s joined by two spaces.
#[must_use]
pub fn caption_suffix(tags: &[String]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let hashtags: Vec<String> = tags.iter().map(|tag| format!("#{tag}")).collect();
    format!("\n\n{}", hashtags.join("  "))
}

fn push_unique<T: PartialEq>(out: &mut Vec<T>, value: T) {
    if !out.contains(&value) {
        out.push(value);
    }
}

impl DispatchEngine {
    /// Create an engine over a gateway, catalogs and provider table.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn Gateway>,
        catalog: Arc<Catalog>,
        providers: Vec<Arc<dyn ContentProvider>>,
    ) -> Self {
        Self {
            gateway,
            catalog,
            providers,
        }
    }

    /// Final tag sequence: catalog tags in catalog order, custom tags
    /// in insertion order, then additional tags in caller order, with
    /// duplicates across sources collapsed.
    #[must_use]
    pub fn resolve_tags(&self, draft: &Draft, additional: &[String]) -> Vec<String> {
        let mut tags = Vec::new();
        for tag in draft.resolved_tags(&self.catalog) {
            push_unique(&mut tags, tag);
        }
        for tag in additional {
            push_unique(&mut tags, tag.clone());
        }
        tags
    }

    /// Final target set; an empty resolution falls back to the first
    /// catalog target.
    #[must_use]
    pub fn resolve_targets(&self, draft: &Draft, additional: &[Target]) -> Vec<Target> {
        let mut targets = Vec::new();
        for target in draft.resolved_targets(&self.catalog) {
            push_unique(&mut targets, target);
        }
        for target in additional {
            push_unique(&mut targets, target.clone());
        }
        if targets.is_empty() {
            targets.extend(self.catalog.targets.first().cloned());
        }
        targets
    }

    /// Deliver a draft to every resolved target, concurrently.
    pub async fn dispatch(
        &self,
        draft: &Draft,
        targets_additional: &[Target],
        tags_additional: &[String],
    ) {
        let tags = self.resolve_tags(draft, tags_additional);
        let suffix = caption_suffix(&tags);
        let targets = self.resolve_targets(draft, targets_additional);

        let deliveries = targets
            .iter()
            .map(|target| self.deliver_one(&draft.source_url, &suffix, target));
        join_all(deliveries).await;
    }

    async fn deliver_one(&self, url: &str, suffix: &str, target: &Target) {
        let outcome = match classify(&self.providers, url) {
            Some(provider) => provider
                .deliver(self.gateway.as_ref(), url, suffix, target)
                .await
                .map_err(|e| (provider.name(), e)),
            None => {
                let text = format!("{url}{suffix}");
                self.gateway
                    .send_text(target, &text)
                    .await
                    .map_err(|e| ("plain", anyhow::Error::from(e)))
            }
        };

        match outcome {
            Ok(()) => info!(url, target = %target, "pushed"),
            Err((provider, e)) => {
                error!(url, target = %target, provider, error = %e, "delivery failed");
            }
        }
    }

    /// Batch push: atomically drain the queue, then dispatch each
    /// removed draft independently with the same additional tags and
    /// targets. Returns the drained message ids so the caller can
    /// re-render their keyboards.
    pub async fn dispatch_all(
        &self,
        queue: &PushQueue,
        targets_additional: &[Target],
        tags_additional: &[String],
    ) -> Vec<MessageId> {
        let drained = queue.snapshot_and_clear().await;
        let ids: Vec<MessageId> = drained.keys().copied().collect();

        let pushes = drained
            .values()
            .map(|draft| self.dispatch(draft, targets_additional, tags_additional));
        join_all(pushes).await;
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_empty_without_tags() {
        assert_eq!(caption_suffix(&[]), "");
    }

    #[test]
    fn suffix_joins_hashtags_with_two_spaces() {
        let tags = vec!["a".to_string(), "b".to_string()];
        assert_eq!(caption_suffix(&tags), "\n\n#a  #b");
    }

    #[test]
    fn push_unique_collapses_duplicates() {
        let mut out = vec!["a".to_string()];
        push_unique(&mut out, "a".to_string());
        push_unique(&mut out, "b".to_string());
        assert_eq!(out, vec!["a", "b"]);
    }
}
