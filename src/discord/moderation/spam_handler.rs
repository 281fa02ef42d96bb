// Discord-specific spam handling - maps gateway messages into the core's
// plain record and hands sanctioning verdicts to the executor.

use crate::core::moderation::InboundMessage;
use crate::discord::Data;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Check a message for spam and dispatch the ban if needed.
///
/// Returns `true` if the message was judged spam. The ban itself runs in a
/// spawned task so the next event is never held up by the HTTP calls.
pub async fn handle_message_for_spam(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> bool {
    // Skip bots and DMs before touching the cache
    if msg.author.bot || msg.guild_id.is_none() {
        return false;
    }

    let Some(inbound) = to_inbound(ctx, msg).await else {
        return false;
    };

    let verdict = data.anti_spam.evaluate(&inbound).await;
    if !verdict.should_sanction() {
        return false;
    }

    let action = verdict.to_action(&inbound);
    let executor = Arc::clone(&data.executor);
    let display_name = inbound.author_display_name;
    tokio::spawn(async move {
        if let Err(e) = executor.execute(&action, &display_name).await {
            tracing::error!(
                user_id = action.target_user_id,
                guild_id = action.guild_id,
                "Failed to sanction spammer: {}",
                e
            );
        }
    });

    true
}

/// Build the plain inbound record for a guild message.
///
/// Owner and role names come from the cache, falling back to one HTTP fetch.
/// Returns `None` when the guild cannot be resolved at all, in which case the
/// message is let through.
pub async fn to_inbound(ctx: &serenity::Context, msg: &serenity::Message) -> Option<InboundMessage> {
    let guild_id = msg.guild_id?;
    let member_roles: Vec<serenity::RoleId> = msg
        .member
        .as_ref()
        .map(|m| m.roles.clone())
        .unwrap_or_default();

    // The cache guard is not Send, so keep it inside this block
    let cached = {
        ctx.cache.guild(guild_id).map(|guild| {
            let names = member_roles
                .iter()
                .filter_map(|id| guild.roles.get(id).map(|r| r.name.clone()))
                .collect::<Vec<_>>();
            (guild.owner_id, names)
        })
    };

    let (owner_id, author_roles) = match cached {
        Some(found) => found,
        None => match guild_id.to_partial_guild(&ctx.http).await {
            Ok(guild) => {
                let names = member_roles
                    .iter()
                    .filter_map(|id| guild.roles.get(id).map(|r| r.name.clone()))
                    .collect();
                (guild.owner_id, names)
            }
            Err(e) => {
                tracing::warn!(
                    guild_id = guild_id.get(),
                    "Could not resolve guild for spam check: {}",
                    e
                );
                return None;
            }
        },
    };

    Some(InboundMessage {
        message_id: msg.id.get(),
        author_id: msg.author.id.get(),
        author_display_name: msg
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| msg.author.name.clone()),
        is_bot: msg.author.bot,
        guild_id: Some(guild_id.get()),
        channel_id: msg.channel_id.get(),
        text: msg.content.clone(),
        mentioned_user_ids: msg.mentions.iter().map(|u| u.id.get()).collect(),
        timestamp: chrono::Utc::now(),
        author_roles,
        is_guild_owner: owner_id == msg.author.id,
    })
}
