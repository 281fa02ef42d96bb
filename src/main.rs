// This is the entry point of the anti-spam bot.
//
// **Architecture Overview:**
// - `core/` = Detection engine (platform-agnostic)
// - `infra/` = Implementations of core traits (config file storage)
// - `discord/` = Discord-specific adapters (event mapping, bans, commands)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands, the message handler and the window sweep

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::AntiSpamService;
use crate::discord::moderation::executor::DiscordModerationExecutor;
use crate::discord::moderation::spam_handler::handle_message_for_spam;
use crate::discord::{Data, Error};
use crate::infra::moderation::JsonSpamConfigStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

const DEFAULT_CONFIG_PATH: &str = "data/bot_config.json";
const DEFAULT_MOD_LOG_CHANNEL: &str = "mod-log";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if handle_message_for_spam(ctx, new_message, data).await {
                tracing::debug!(message_id = new_message.id.get(), "Spam message handled");
            }
        }
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!(
                user = %data_about_bot.user.name,
                guilds = data_about_bot.guilds.len(),
                "Logged in"
            );
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    let config_path =
        std::env::var("ANTISPAM_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mod_log_channel = std::env::var("ANTISPAM_MOD_LOG_CHANNEL")
        .unwrap_or_else(|_| DEFAULT_MOD_LOG_CHANNEL.to_string());
    let sweep_interval_secs = std::env::var("ANTISPAM_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let config_store = JsonSpamConfigStore::new(&config_path);
    let anti_spam = Arc::new(AntiSpamService::new(config_store).await);

    let config = anti_spam.config().await;
    tracing::info!(
        path = %config_path,
        spam_threshold = config.spam_threshold,
        spam_time_window = config.spam_time_window_secs,
        dupe_threshold = config.dupe_threshold,
        whitelisted_users = config.whitelist_users.len(),
        "Anti-spam config loaded"
    );

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::moderation::commands::whitelist(),
                discord::moderation::commands::antispam(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            // Missing permissions and command failures get a reply instead of a crash
            on_error: |error| {
                Box::pin(async move {
                    if let Err(e) = poise::builtins::on_error(error).await {
                        tracing::error!("Error while handling command error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!(
                    count = framework.options().commands.len(),
                    "Slash commands registered"
                );

                let executor = Arc::new(DiscordModerationExecutor::new(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    mod_log_channel,
                ));

                // Background sweep so idle users' windows don't linger forever
                let sweeper = Arc::clone(&anti_spam);
                tokio::spawn(async move {
                    use std::time::Duration as StdDuration;
                    use tokio::time::sleep;

                    loop {
                        sleep(StdDuration::from_secs(sweep_interval_secs)).await;
                        sweeper.sweep_idle(chrono::Utc::now()).await;
                    }
                });

                Ok(Data {
                    anti_spam,
                    executor,
                })
            })
        })
        .build();

    // Create the client and start the bot
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
