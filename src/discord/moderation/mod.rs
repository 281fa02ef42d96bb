// Discord side of the anti-spam system: event mapping, sanction delivery and
// the admin commands.

pub mod commands;
pub mod executor;
pub mod spam_handler;

use crate::core::moderation::AntiSpamService;
use crate::infra::moderation::JsonSpamConfigStore;
use executor::DiscordModerationExecutor;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// State shared across all commands and event handlers.
pub struct Data {
    pub anti_spam: Arc<AntiSpamService<JsonSpamConfigStore>>,
    pub executor: Arc<DiscordModerationExecutor>,
}
