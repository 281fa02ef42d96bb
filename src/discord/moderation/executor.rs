// Delivers sanctions to Discord: ban, delete the message, post to the mod log.

use crate::core::moderation::{ActionKind, ModerationAction};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use thiserror::Error;

/// Discord rejects audit-log reasons longer than this.
const MAX_BAN_REASON_CHARS: usize = 512;
/// Also wipe the last day of the spammer's messages.
const BAN_DELETE_MESSAGE_DAYS: u8 = 1;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Missing permission to ban user {0}")]
    PermissionDenied(u64),

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),
}

pub struct DiscordModerationExecutor {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    log_channel_name: String,
}

impl DiscordModerationExecutor {
    pub fn new(
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        log_channel_name: impl Into<String>,
    ) -> Self {
        Self {
            http,
            cache,
            log_channel_name: log_channel_name.into(),
        }
    }

    /// Ban the author, then best-effort delete and log.
    ///
    /// Only a failed ban is returned as an error. If the ban fails nothing is
    /// deleted or posted.
    pub async fn execute(
        &self,
        action: &ModerationAction,
        display_name: &str,
    ) -> Result<(), ActionError> {
        let guild_id = match (action.kind, action.guild_id) {
            (ActionKind::Ban, Some(guild_id)) => serenity::GuildId::new(guild_id),
            _ => return Ok(()),
        };
        let user_id = serenity::UserId::new(action.target_user_id);
        let channel_id = serenity::ChannelId::new(action.channel_id);

        let ban_reason = truncate_chars(
            &format!("Banned for spam: {}", action.reason),
            MAX_BAN_REASON_CHARS,
        );
        if let Err(e) = guild_id
            .ban_with_reason(&self.http, user_id, BAN_DELETE_MESSAGE_DAYS, &ban_reason)
            .await
        {
            if is_permission_denied(&e) {
                return Err(ActionError::PermissionDenied(action.target_user_id));
            }
            return Err(e.into());
        }

        tracing::info!(
            user_id = action.target_user_id,
            guild_id = guild_id.get(),
            reason = %action.reason,
            "Banned spammer"
        );

        // The ban usually removes it already
        if let Err(e) = channel_id
            .delete_message(&self.http, serenity::MessageId::new(action.originating_message_id))
            .await
        {
            tracing::debug!("Spam message already gone or not deletable: {}", e);
        }

        let log_channel = self.find_log_channel(guild_id).await.unwrap_or(channel_id);
        let log_msg = format_ban_log(action, display_name);
        if let Err(e) = log_channel.say(&self.http, log_msg).await {
            tracing::warn!("Failed to send ban log message: {}", e);
        }

        Ok(())
    }

    /// Look the mod-log channel up in the cache, asking Discord only on a miss.
    async fn find_log_channel(&self, guild_id: serenity::GuildId) -> Option<serenity::ChannelId> {
        // The cache guard is not Send, so resolve it before any await
        let cached = self.cache.guild(guild_id).map(|guild| {
            guild
                .channels
                .values()
                .find(|c| is_log_channel(c.kind, &c.name, &self.log_channel_name))
                .map(|c| c.id)
        });
        if let Some(Some(id)) = cached {
            return Some(id);
        }

        let channels = match guild_id.channels(&self.http).await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!("Failed to list channels for mod log lookup: {}", e);
                return None;
            }
        };

        channels
            .values()
            .find(|c| is_log_channel(c.kind, &c.name, &self.log_channel_name))
            .map(|c| c.id)
    }
}

fn is_log_channel(kind: serenity::ChannelType, name: &str, wanted: &str) -> bool {
    kind == serenity::ChannelType::Text && name == wanted
}

fn is_permission_denied(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(e) => e.status_code().map(|s| s.as_u16()) == Some(403),
        serenity::Error::Model(serenity::ModelError::InvalidPermissions { .. }) => true,
        _ => false,
    }
}

fn format_ban_log(action: &ModerationAction, display_name: &str) -> String {
    format!(
        "🚨 **User banned**\n\
         **User**: <@{}> {} (`{}`)\n\
         **Reason**: {}\n\
         **Channel**: <#{}>",
        action.target_user_id,
        display_name,
        action.target_user_id,
        action.reason,
        action.channel_id
    )
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ban(reason: &str) -> ModerationAction {
        ModerationAction {
            kind: ActionKind::Ban,
            guild_id: Some(1),
            target_user_id: 42,
            reason: reason.to_string(),
            originating_message_id: 7,
            channel_id: 99,
        }
    }

    #[test]
    fn test_ban_log_mentions_user_reason_and_channel() {
        let log = format_ban_log(&ban("Unauthorized invite link"), "spammer");

        assert!(log.contains("<@42> spammer (`42`)"));
        assert!(log.contains("**Reason**: Unauthorized invite link"));
        assert!(log.contains("<#99>"));
    }

    #[test]
    fn test_log_channel_matches_text_channel_by_exact_name() {
        assert!(is_log_channel(serenity::ChannelType::Text, "mod-log", "mod-log"));
        assert!(!is_log_channel(serenity::ChannelType::Voice, "mod-log", "mod-log"));
        assert!(!is_log_channel(serenity::ChannelType::Text, "Mod-Log", "mod-log"));
        assert!(!is_log_channel(serenity::ChannelType::Text, "general", "mod-log"));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        let long = "é".repeat(600);
        let truncated = truncate_chars(&long, MAX_BAN_REASON_CHARS);

        assert_eq!(truncated.chars().count(), MAX_BAN_REASON_CHARS);
        assert_eq!(truncate_chars("short", MAX_BAN_REASON_CHARS), "short");
    }
}
