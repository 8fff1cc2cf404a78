//! Bilibili feed provider.
//!
//! Claims bilibili video/dynamic links (including `b23.tv` short
//! links), scrapes the page's OpenGraph metadata and delivers a photo
//! or formatted text in the MarkdownV2 dialect. Hashtags in the
//! caption suffix are escaped for MarkdownV2 by this provider.

use super::{ContentProvider, SCRAPE_USER_AGENT};
use crate::gateway::{Gateway, Target};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use lazy_regex::regex;
use teloxide::types::ParseMode;
use teloxide::utils::markdown;
use tracing::debug;

/// Longest description fragment carried into a caption.
const DESCRIPTION_LIMIT: usize = 300;

/// Provider for bilibili links.
pub struct BiliFeedProvider {
    http: reqwest::Client,
}

/// OpenGraph fields scraped from a page.
#[derive(Debug, Default, PartialEq, Eq)]
struct PageMeta {
    title: Option<String>,
    description: Option<String>,
    image: Option<String>,
}

impl BiliFeedProvider {
    /// Create a provider sharing the bot's HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let html = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, SCRAPE_USER_AGENT)
            .send()
            .await
            .context("bilibili page request failed")?
            .error_for_status()
            .context("bilibili page returned an error status")?
            .text()
            .await
            .context("bilibili page body read failed")?;
        Ok(html)
    }

    async fn download_image(&self, image_url: &str, referer: &str) -> Result<Bytes> {
        let bytes = self
            .http
            .get(image_url)
            .header(reqwest::header::REFERER, referer)
            .header(reqwest::header::USER_AGENT, SCRAPE_USER_AGENT)
            .send()
            .await
            .context("bilibili image download failed")?
            .error_for_status()
            .context("bilibili image download returned an error status")?
            .bytes()
            .await
            .context("bilibili image body read failed")?;
        Ok(bytes)
    }
}

fn meta_content(html: &str, property: &str) -> Option<String> {
    // Attribute order varies between bilibili page variants.
    let property_first = format!(
        r#"<meta[^>]*?property="{property}"[^>]*?content="([^"]*)""#
    );
    let content_first = format!(
        r#"<meta[^>]*?content="([^"]*)"[^>]*?property="{property}""#
    );
    for pattern in [property_first, content_first] {
        if let Ok(re) = regex::Regex::new(&pattern) {
            if let Some(captures) = re.captures(html) {
                let content = captures.get(1).map(|m| m.as_str().trim().to_string());
                if content.as_deref().is_some_and(|c| !c.is_empty()) {
                    return content;
                }
            }
        }
    }
    None
}

/// Scrape title, description and preview image from page HTML.
fn parse_meta(html: &str) -> PageMeta {
    let title = meta_content(html, "og:title").or_else(|| {
        regex!(r"<title[^>]*>([^<]+)</title>")
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    });
    PageMeta {
        title,
        description: meta_content(html, "og:description"),
        image: meta_content(html, "og:image").map(absolutize),
    }
}

/// Protocol-relative image urls are common on bilibili pages.
fn absolutize(url: String) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn build_caption(meta: &PageMeta, caption_suffix: &str) -> String {
    let mut caption = String::new();
    if let Some(title) = &meta.title {
        caption.push_str(&format!("*{}*", markdown::escape(title)));
    }
    if let Some(description) = &meta.description {
        if !caption.is_empty() {
            caption.push('\n');
        }
        caption.push_str(&markdown::escape(&truncate_chars(
            description,
            DESCRIPTION_LIMIT,
        )));
    }
    // MarkdownV2 needs the hashtags escaped too (`\#tag`).
    caption.push_str(&markdown::escape(caption_suffix));
    caption
}

#[async_trait]
impl ContentProvider for BiliFeedProvider {
    fn name(&self) -> &'static str {
        "bilifeed"
    }

    fn claims(&self, url: &str) -> bool {
        regex!(r"(?:https?://)?(?:[\w-]+\.)?(?:bilibili\.com|b23\.tv|bilibili22\.com)/\S*")
            .is_match(url)
    }

    async fn deliver(
        &self,
        gateway: &dyn Gateway,
        url: &str,
        caption_suffix: &str,
        target: &Target,
    ) -> Result<()> {
        let html = self.fetch_page(url).await?;
        let meta = parse_meta(&html);
        debug!(
            url,
            has_image = meta.image.is_some(),
            "bilibili page scraped"
        );
        let caption = build_caption(&meta, caption_suffix);

        match &meta.image {
            Some(image_url) => {
                let image = self.download_image(image_url, url).await?;
                gateway
                    .send_photo(target, image, &caption, ParseMode::MarkdownV2, Some(url))
                    .await?;
            }
            None => {
                gateway
                    .send_rich_text(target, &caption, ParseMode::MarkdownV2, Some(url))
                    .await?;
            }
        }
        Ok(())
    }
}
