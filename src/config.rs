//! Configuration and settings management
//!
//! Loads settings from layered config files and environment variables
//! and defines the tunable constants of the bot.

use crate::gateway::Target;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use teloxide::types::Chat;

/// Application settings loaded from config files and the environment
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Ordered catalog of selectable tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Ordered catalog of push targets (chat ids or @usernames).
    /// Index 0 is the fallback target when a draft selects none.
    pub targets: Vec<String>,

    /// Chats the bot watches for pushable messages. Numeric chat ids
    /// or @usernames; an empty list watches everything.
    #[serde(default)]
    pub watchers: Vec<String>,
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the target catalog
    /// is empty.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;

        if settings.targets.is_empty() {
            return Err(ConfigError::Message(
                "at least one push target must be configured".to_string(),
            ));
        }

        Ok(settings)
    }

    /// Whether a chat is on the watcher allow-list.
    ///
    /// An empty list allows every chat.
    #[must_use]
    pub fn is_watcher(&self, chat: &Chat) -> bool {
        if self.watchers.is_empty() {
            return true;
        }
        self.watchers.iter().any(|entry| {
            if let Ok(id) = entry.parse::<i64>() {
                id == chat.id.0
            } else {
                chat.username().is_some_and(|username| {
                    entry.trim_start_matches('@').eq_ignore_ascii_case(username)
                })
            }
        })
    }
}

/// Immutable tag and target catalogs, fixed for the duration of a run.
///
/// Draft selection state stores indices into these.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Ordered tag strings
    pub tags: Vec<String>,
    /// Ordered, normalized push targets
    pub targets: Vec<Target>,
}

impl Catalog {
    /// Build the catalogs from loaded settings, normalizing targets.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tags: settings.tags.clone(),
            targets: settings.targets.iter().map(Target::new).collect(),
        }
    }
}

/// Seconds to wait for a reply to a custom-tag prompt
pub const CUSTOM_TAG_PROMPT_TIMEOUT_SECS: u64 = 5;

// Telegram API retry policy for outbound sends
/// Maximum retry attempts for a Telegram API send
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff in milliseconds
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 250;
/// Backoff cap in milliseconds
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 5_000;
