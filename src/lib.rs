//! Push helper bot library
//!
//! A Telegram relay helper: watched messages are queued as draft
//! posts through an inline-keyboard UI, tagged, and fanned out to one
//! or more target channels, with source-specific rich-media scraping
//! for recognized URL patterns.

/// Callback handlers, keyboards and admin commands
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Draft fan-out engine
pub mod dispatch;
/// Messaging gateway abstraction over the Telegram API
pub mod gateway;
/// Custom-tag reply rendezvous
pub mod prompt;
/// Rich-media content providers
pub mod providers;
/// Pending-push draft registry
pub mod queue;
/// Inbound message URL resolution
pub mod resolver;
