//! Bot-facing surface: callback state machine, keyboards, commands.

/// Button-press state machine for draft selection
pub mod callbacks;
/// Admin commands (/check, /push, /start)
pub mod commands;
/// Inline keyboard rendering
pub mod views;

use crate::config::Catalog;
use crate::dispatch::DispatchEngine;
use crate::gateway::Gateway;
use crate::prompt::PendingPrompts;
use crate::queue::PushQueue;
use std::sync::Arc;

/// Shared state handed to every handler by the update dispatcher.
///
/// The registry and prompt table are owned here and passed by
/// reference; nothing in the crate is a module-level global.
pub struct BotContext {
    /// Transport seam for all outbound side effects
    pub gateway: Arc<dyn Gateway>,
    /// The pending-push draft registry
    pub queue: Arc<PushQueue>,
    /// Outstanding custom-tag prompts
    pub prompts: Arc<PendingPrompts>,
    /// Immutable tag/target catalogs
    pub catalog: Arc<Catalog>,
    /// Fan-out engine
    pub engine: Arc<DispatchEngine>,
}
