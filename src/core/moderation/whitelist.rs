// Whitelist authority and the administrative command that edits it.

use super::moderation_models::{InboundMessage, SpamConfig};
use thiserror::Error;

pub const WHITELIST_USAGE: &str = "Usage:\n\
    `/whitelist add @user` - add a user to the whitelist\n\
    `/whitelist remove @user` - remove a user from the whitelist\n\
    `/whitelist list` - show whitelisted users";

/// Guild owner, a whitelisted role, or an explicitly whitelisted id.
pub fn is_exempt(message: &InboundMessage, config: &SpamConfig) -> bool {
    message.is_guild_owner
        || message
            .author_roles
            .iter()
            .any(|role| config.whitelist_roles.contains(role))
        || config.whitelist_users.contains(&message.author_id)
}

/// A parsed `/whitelist` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistCommand {
    Add(u64),
    Remove(u64),
    List,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WhitelistCommandError {
    #[error("Unknown action `{0}`.\n{usage}", usage = WHITELIST_USAGE)]
    UnknownAction(String),

    #[error("`{0}` needs a user.\n{usage}", usage = WHITELIST_USAGE)]
    MissingUser(&'static str),
}

impl WhitelistCommand {
    /// Parse the action keyword (case-insensitive) and optional target user.
    pub fn parse(action: &str, user_id: Option<u64>) -> Result<Self, WhitelistCommandError> {
        match action.trim().to_lowercase().as_str() {
            "add" => user_id
                .map(WhitelistCommand::Add)
                .ok_or(WhitelistCommandError::MissingUser("add")),
            "remove" => user_id
                .map(WhitelistCommand::Remove)
                .ok_or(WhitelistCommandError::MissingUser("remove")),
            "list" => Ok(WhitelistCommand::List),
            other => Err(WhitelistCommandError::UnknownAction(other.to_string())),
        }
    }
}

/// What a whitelist command did, for the caller to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistOutcome {
    Added(u64),
    AlreadyListed(u64),
    Removed(u64),
    NotListed(u64),
    Listed(Vec<u64>),
}
