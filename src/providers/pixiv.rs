//! Pixiv artwork provider.
//!
//! Claims `pixiv.net/artworks/<id>` links (and the legacy
//! `member_illust.php?illust_id=` form), fetches the artwork record
//! from the public ajax endpoint, downloads the preview image and
//! delivers it as a photo with an HTML caption.

use super::{ContentProvider, SCRAPE_USER_AGENT};
use crate::gateway::{Gateway, Target};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use html_escape::encode_text;
use lazy_regex::regex;
use serde::Deserialize;
use teloxide::types::ParseMode;
use tracing::debug;

const PIXIV_REFERER: &str = "https://www.pixiv.net/";

#[derive(Debug, Deserialize)]
struct AjaxResponse {
    error: bool,
    message: String,
    body: Option<IllustBody>,
}

#[derive(Debug, Deserialize)]
struct IllustBody {
    title: String,
    #[serde(rename = "userName")]
    user_name: String,
    urls: IllustUrls,
}

#[derive(Debug, Deserialize)]
struct IllustUrls {
    regular: Option<String>,
    original: Option<String>,
}

/// Provider for pixiv artwork links.
pub struct PixivProvider {
    http: reqwest::Client,
}

impl PixivProvider {
    /// Create a provider sharing the bot's HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn illust_id(url: &str) -> Option<&str> {
        if let Some(captures) = regex!(r"pixiv\.net/(?:en/)?artworks/(\d+)").captures(url) {
            return captures.get(1).map(|m| m.as_str());
        }
        regex!(r"pixiv\.net/member_illust\.php\?[^\s]*illust_id=(\d+)")
            .captures(url)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
    }

    async fn fetch_illust(&self, id: &str) -> Result<IllustBody> {
        let endpoint = format!("https://www.pixiv.net/ajax/illust/{id}");
        let response: AjaxResponse = self
            .http
            .get(&endpoint)
            .header(reqwest::header::REFERER, PIXIV_REFERER)
            .header(reqwest::header::USER_AGENT, SCRAPE_USER_AGENT)
            .send()
            .await
            .context("pixiv ajax request failed")?
            .error_for_status()
            .context("pixiv ajax returned an error status")?
            .json()
            .await
            .context("pixiv ajax payload was not valid json")?;

        if response.error {
            return Err(anyhow!("pixiv rejected illust {id}: {}", response.message));
        }
        response
            .body
            .ok_or_else(|| anyhow!("pixiv illust {id} has no body"))
    }

    async fn download_image(&self, image_url: &str) -> Result<Bytes> {
        // pximg refuses requests without a pixiv referer.
        let bytes = self
            .http
            .get(image_url)
            .header(reqwest::header::REFERER, PIXIV_REFERER)
            .header(reqwest::header::USER_AGENT, SCRAPE_USER_AGENT)
            .send()
            .await
            .context("pixiv image download failed")?
            .error_for_status()
            .context("pixiv image download returned an error status")?
            .bytes()
            .await
            .context("pixiv image body read failed")?;
        Ok(bytes)
    }
}

#[async_trait]
impl ContentProvider for PixivProvider {
    fn name(&self) -> &'static str {
        "pixiv"
    }

    fn claims(&self, url: &str) -> bool {
        Self::illust_id(url).is_some()
    }

    async fn deliver(
        &self,
        gateway: &dyn Gateway,
        url: &str,
        caption_suffix: &str,
        target: &Target,
    ) -> Result<()> {
        let id = Self::illust_id(url).ok_or_else(|| anyhow!("unclaimed url: {url}"))?;
        let illust = self.fetch_illust(id).await?;

        let image_url = illust
            .urls
            .regular
            .as_deref()
            .or(illust.urls.original.as_deref())
            .ok_or_else(|| anyhow!("pixiv illust {id} has no image urls"))?;
        let image = self.download_image(image_url).await?;
        debug!(illust = id, bytes = image.len(), "pixiv image downloaded");

        let caption = format!(
            "<b>{}</b> / {}{}",
            encode_text(&illust.title),
            encode_text(&illust.user_name),
            encode_text(caption_suffix),
        );
        gateway
            .send_photo(target, image, &caption, ParseMode::Html, Some(url))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_artwork_urls() {
        let provider = PixivProvider::new(reqwest::Client::new());
        assert!(provider.claims("https://www.pixiv.net/artworks/98765432"));
        assert!(provider.claims("https://pixiv.net/en/artworks/1"));
        assert!(provider.claims(
            "https://www.pixiv.net/member_illust.php?mode=medium&illust_id=123"
        ));
        assert!(!provider.claims("https://www.pixiv.net/users/42"));
        assert!(!provider.claims("https://example.com/artworks/5"));
    }

    #[test]
    fn extracts_illust_id() {
        assert_eq!(
            PixivProvider::illust_id("https://www.pixiv.net/artworks/555"),
            Some("555")
        );
        assert_eq!(PixivProvider::illust_id("https://example.com"), None);
    }

    #[test]
    fn ajax_payload_deserializes() {
        let raw = r#"{
            "error": false,
            "message": "",
            "body": {
                "title": "Sunset",
                "userName": "someone",
                "urls": {"regular": "https://i.pximg.net/img/1_master.jpg", "original": null}
            }
        }"#;
        let parsed: AjaxResponse = serde_json::from_str(raw).expect("payload parses");
        assert!(!parsed.error);
        let body = parsed.body.expect("body present");
        assert_eq!(body.title, "Sunset");
        assert_eq!(
            body.urls.regular.as_deref(),
            Some("https://i.pximg.net/img/1_master.jpg")
        );
    }
}
