//! Inbound message URL resolution.
//!
//! Extracts the single canonical URL a message references. Priority
//! order, first match wins: a URL entity's literal text, a text-link
//! entity's target, the first `scheme://` match in the raw text, and
//! finally the raw text itself. There is no error case: non-URL text
//! simply flows down the plain-text dispatch path.

use lazy_regex::regex;
use teloxide::types::{Message, MessageEntity, MessageEntityKind};

/// Resolve the canonical URL of a message from its text and entities.
///
/// Entity offsets are UTF-16 code units, per the Telegram API.
#[must_use]
pub fn resolve(text: &str, entities: &[MessageEntity]) -> String {
    for entity in entities {
        if matches!(entity.kind, MessageEntityKind::Url) {
            if let Some(slice) = utf16_slice(text, entity.offset, entity.length) {
                return slice;
            }
        }
    }

    for entity in entities {
        if let MessageEntityKind::TextLink { url } = &entity.kind {
            return url.to_string();
        }
    }

    if let Some(found) = regex!(r"[A-Za-z][A-Za-z0-9+.-]*://\S+").find(text) {
        return found.as_str().to_string();
    }

    text.to_string()
}

/// Resolve from a full message, falling back through caption fields.
#[must_use]
pub fn resolve_from_message(message: &Message) -> String {
    let text = message.text().or_else(|| message.caption()).unwrap_or_default();
    let entities = message
        .entities()
        .or_else(|| message.caption_entities())
        .unwrap_or_default();
    resolve(text, entities)
}

fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    if end > units.len() {
        return None;
    }
    String::from_utf16(&units[offset..end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_entity(offset: usize, length: usize) -> MessageEntity {
        MessageEntity {
            kind: MessageEntityKind::Url,
            offset,
            length,
        }
    }

    #[test]
    fn url_entity_wins_over_plain_text() {
        let text = "look: https://example.com/a and other words";
        let resolved = resolve(text, &[url_entity(6, 21)]);
        assert_eq!(resolved, "https://example.com/a");
    }

    #[test]
    fn text_link_used_when_no_url_entity() {
        let url = reqwest::Url::parse("https://example.com/hidden").expect("static url");
        let entity = MessageEntity {
            kind: MessageEntityKind::TextLink { url },
            offset: 0,
            length: 4,
        };
        let resolved = resolve("here", &[entity]);
        assert_eq!(resolved, "https://example.com/hidden");
    }

    #[test]
    fn regex_scan_without_entities() {
        let resolved = resolve("see ftp://files.example.com/x now", &[]);
        assert_eq!(resolved, "ftp://files.example.com/x");
    }

    #[test]
    fn raw_text_fallback() {
        let resolved = resolve("no links here at all", &[]);
        assert_eq!(resolved, "no links here at all");
    }

    #[test]
    fn utf16_offsets_with_wide_chars() {
        // "日本" is 2 UTF-16 units; the entity starts after "日本 ".
        let text = "日本 https://example.jp/";
        let resolved = resolve(text, &[url_entity(3, 19)]);
        assert_eq!(resolved, "https://example.jp/");
    }

    #[test]
    fn out_of_range_entity_is_ignored() {
        let resolved = resolve("short", &[url_entity(2, 50)]);
        assert_eq!(resolved, "short");
    }
}
