// Anti-spam slash commands: whitelist administration and a status view.

use crate::core::moderation::{WhitelistCommand, WhitelistOutcome};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Manage the anti-spam whitelist.
///
/// Actions: `add` / `remove` with a user, or `list`.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn whitelist(
    ctx: Context<'_>,
    #[description = "Action to run (add/remove/list)"] action: String,
    #[description = "User to add or remove (not needed for list)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let command = match WhitelistCommand::parse(&action, user.as_ref().map(|u| u.id.get())) {
        Ok(command) => command,
        Err(e) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(e.to_string())
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
    };

    let outcome = match ctx.data().anti_spam.apply_whitelist(command).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Failed to persist whitelist change: {}", e);
            ctx.send(
                poise::CreateReply::default()
                    .content("❌ The whitelist changed but could not be saved to disk.")
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
    };

    let reply = match outcome {
        WhitelistOutcome::Added(id) => poise::CreateReply::default()
            .content(format!("✅ Added <@{}> to the whitelist.", id)),
        WhitelistOutcome::AlreadyListed(id) => poise::CreateReply::default()
            .content(format!("<@{}> is already whitelisted.", id)),
        WhitelistOutcome::Removed(id) => poise::CreateReply::default()
            .content(format!("✅ Removed <@{}> from the whitelist.", id)),
        WhitelistOutcome::NotListed(id) => poise::CreateReply::default()
            .content(format!("❌ <@{}> is not whitelisted.", id)),
        WhitelistOutcome::Listed(ids) if ids.is_empty() => {
            poise::CreateReply::default().content("The whitelist is empty.")
        }
        WhitelistOutcome::Listed(ids) => {
            let lines: Vec<String> = ids.iter().map(|id| format!("- <@{}>", id)).collect();
            let embed = serenity::CreateEmbed::new()
                .title("Whitelisted users")
                .description(lines.join("\n"))
                .color(serenity::Color::BLUE);
            poise::CreateReply::default().embed(embed)
        }
    };

    ctx.send(reply.ephemeral(true)).await?;
    Ok(())
}

/// Anti-spam information commands.
#[poise::command(
    slash_command,
    subcommands("status"),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn antispam(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - shows help
    Ok(())
}

/// Show the active anti-spam thresholds.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let config = ctx.data().anti_spam.config().await;

    let domains = if config.blocked_domains.is_empty() {
        "None".to_string()
    } else {
        config
            .blocked_domains
            .iter()
            .map(|d| format!("`{}`", d))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let roles = if config.whitelist_roles.is_empty() {
        "None".to_string()
    } else {
        config
            .whitelist_roles
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let embed = serenity::CreateEmbed::new()
        .title("🛡️ Anti-Spam Status")
        .color(0x00FF00)
        .field(
            "Flood",
            format!(
                "{} messages / {} seconds",
                config.spam_threshold, config.spam_time_window_secs
            ),
            true,
        )
        .field(
            "Duplicates",
            format!(
                "{} identical messages within {} seconds",
                config.dupe_threshold,
                config.spam_time_window_secs.saturating_mul(2)
            ),
            true,
        )
        .field(
            "Mention Limit",
            format!("{} mentions per message", config.mention_limit),
            true,
        )
        .field(
            "Caps",
            format!("{:.0}% of message", config.caps_ratio * 100.0),
            true,
        )
        .field(
            "Repeated Characters",
            format!("{} in a row", config.max_duplicate_chars),
            true,
        )
        .field("Blocked Domains", domains, false)
        .field("Whitelisted Roles", roles, false)
        .field(
            "Whitelisted Users",
            config.whitelist_users.len().to_string(),
            true,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
