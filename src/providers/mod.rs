//! Rich-media content providers.
//!
//! A provider recognizes a URL pattern and delivers the post with
//! scraped media instead of plain text. Providers implement one
//! capability interface and are evaluated through a single ordered
//! classification table; the first provider that claims a URL wins,
//! and no claim means the plain-text path.
//!
//! A provider failure marks that one target as failed: the dispatch
//! engine neither retries nor falls back to plain text for it.

/// Bilibili link previews via OpenGraph scraping
pub mod bilifeed;
/// Pixiv artwork scraping via the public ajax endpoint
pub mod pixiv;

pub use bilifeed::BiliFeedProvider;
pub use pixiv::PixivProvider;

use crate::gateway::{Gateway, Target};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Browser-like user agent for scraping endpoints that reject bots.
pub const SCRAPE_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A pluggable enriched-delivery capability for one URL family.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether this provider recognizes the URL.
    fn claims(&self, url: &str) -> bool;

    /// Deliver the post to one target. `caption_suffix` is the
    /// pre-joined hashtag block (empty, or two newlines followed by
    /// `#tag`s joined by two spaces); escaping it for the provider's
    /// markup dialect is the provider's responsibility.
    ///
    /// # Errors
    ///
    /// Returns an error when scraping or sending fails; the engine
    /// logs it and skips this target.
    async fn deliver(
        &self,
        gateway: &dyn Gateway,
        url: &str,
        caption_suffix: &str,
        target: &Target,
    ) -> Result<()>;
}

/// First provider in the table that claims the URL, if any.
#[must_use]
pub fn classify<'a>(
    providers: &'a [Arc<dyn ContentProvider>],
    url: &str,
) -> Option<&'a Arc<dyn ContentProvider>> {
    providers.iter().find(|provider| provider.claims(url))
}

/// The fixed provider priority order: pixiv, then bilibili.
#[must_use]
pub fn default_providers(http: reqwest::Client) -> Vec<Arc<dyn ContentProvider>> {
    vec![
        Arc::new(PixivProvider::new(http.clone())),
        Arc::new(BiliFeedProvider::new(http)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_order_is_fixed() {
        let providers = default_providers(reqwest::Client::new());
        let pixiv = classify(&providers, "https://www.pixiv.net/artworks/1234")
            .expect("pixiv url claimed");
        assert_eq!(pixiv.name(), "pixiv");

        let bili = classify(&providers, "https://www.bilibili.com/video/BV1xx411c7mD")
            .expect("bilibili url claimed");
        assert_eq!(bili.name(), "bilifeed");

        assert!(classify(&providers, "https://example.com/post").is_none());
        assert!(classify(&providers, "not a url at all").is_none());
    }
}
