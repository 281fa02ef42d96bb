// Anti-spam service - core business logic for spam detection.
//
// This service handles:
// - Whitelist exemption (checked before anything is recorded)
// - Message flood detection over a sliding window
// - Content heuristics (caps, repeated characters, domains, invites, mentions)
// - Duplicate run detection over a longer window
// - Whitelist administration and persistence
//
// NO Discord dependencies here - just pure domain logic.

use super::detectors::{check_duplicate, check_rate, evaluate_content, CheckContext};
use super::moderation_models::{InboundMessage, SpamConfig, Verdict};
use super::whitelist::{is_exempt, WhitelistCommand, WhitelistOutcome};
use super::window_store::WindowStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum SpamError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Where the detection config lives between restarts.
#[async_trait]
pub trait SpamConfigStore: Send + Sync {
    /// Load the config. Missing or malformed values come back as defaults.
    async fn load(&self) -> Result<SpamConfig, SpamError>;

    /// Persist the whole config document.
    async fn save(&self, config: &SpamConfig) -> Result<(), SpamError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct AntiSpamService<S: SpamConfigStore> {
    store: S,
    config: RwLock<SpamConfig>,
    /// Held from mutation through save so writes land on disk in order
    persist_lock: Mutex<()>,
    windows: WindowStore,
}

impl<S: SpamConfigStore> AntiSpamService<S> {
    /// Load the config from `store` and start with empty windows.
    ///
    /// A store that cannot be read at all leaves the service on defaults.
    pub async fn new(store: S) -> Self {
        let mut config = match store.load().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load anti-spam config, using defaults: {}", e);
                SpamConfig::default()
            }
        };

        for field in config.sanitize() {
            tracing::warn!(field, "Invalid anti-spam config value, using default");
        }

        Self::with_config(store, config)
    }

    /// Build a service around an already validated config.
    pub fn with_config(store: S, config: SpamConfig) -> Self {
        Self {
            store,
            config: RwLock::new(config),
            persist_lock: Mutex::new(()),
            windows: WindowStore::new(),
        }
    }

    /// Snapshot of the current config.
    pub async fn config(&self) -> SpamConfig {
        self.config.read().await.clone()
    }

    /// Evaluate one message and return the verdict.
    ///
    /// Order: exemption short-circuit, flood, content rules, duplicates.
    /// Bot messages and messages outside a guild are never judged.
    pub async fn evaluate(&self, message: &InboundMessage) -> Verdict {
        if message.is_bot || message.guild_id.is_none() {
            return Verdict::clean();
        }

        let config = self.config.read().await;

        // Exempt authors leave no trace in the windows
        if is_exempt(message, &config) {
            return Verdict::clean();
        }

        let now = message.timestamp;
        let snapshot = self.windows.observe(
            message.author_id,
            &message.text,
            now,
            config.rate_window(),
            config.content_window(),
        );

        let mut verdict = Verdict::clean();

        if let Some(v) = check_rate(
            snapshot.rate_count,
            config.spam_threshold,
            config.spam_time_window_secs,
        ) {
            verdict.violations.push(v);
        }

        let ctx = CheckContext {
            text: &message.text,
            mention_count: message.mentioned_user_ids.len(),
            author_exempt: false,
            config: &config,
        };
        verdict.violations.extend(evaluate_content(&ctx));

        let preceding = snapshot
            .content
            .split_last()
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        if let Some(v) = check_duplicate(preceding, &message.text, config.dupe_threshold) {
            verdict.violations.push(v);
        }

        if verdict.should_sanction() {
            tracing::info!(
                user_id = message.author_id,
                guild_id = message.guild_id,
                reasons = %verdict.reason_line(),
                "Spam detected"
            );
        }

        verdict
    }

    /// Apply a whitelist command. `add`/`remove` persist when they change something.
    ///
    /// If the write fails the in-memory change is kept and the error returned.
    pub async fn apply_whitelist(
        &self,
        command: WhitelistCommand,
    ) -> Result<WhitelistOutcome, SpamError> {
        // Serializes mutate+save pairs; evaluation only waits on the config lock
        let _persist = self.persist_lock.lock().await;
        let mut config = self.config.write().await;

        let outcome = match command {
            WhitelistCommand::List => {
                return Ok(WhitelistOutcome::Listed(
                    config.whitelist_users.iter().copied().collect(),
                ));
            }
            WhitelistCommand::Add(user_id) => {
                if !config.whitelist_users.insert(user_id) {
                    return Ok(WhitelistOutcome::AlreadyListed(user_id));
                }
                WhitelistOutcome::Added(user_id)
            }
            WhitelistCommand::Remove(user_id) => {
                if !config.whitelist_users.remove(&user_id) {
                    return Ok(WhitelistOutcome::NotListed(user_id));
                }
                WhitelistOutcome::Removed(user_id)
            }
        };

        let snapshot = config.clone();
        drop(config); // Release lock before persisting

        tracing::info!(?outcome, "Whitelist updated");
        self.store.save(&snapshot).await?;
        Ok(outcome)
    }

    /// Drop window state for users idle longer than the duplicate horizon.
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let horizon = self.config.read().await.content_window();
        let removed = self.windows.sweep(now, horizon);
        tracing::debug!(
            removed,
            remaining = self.windows.tracked_users(),
            "Swept idle spam windows"
        );
        removed
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::Violation;
    use chrono::Duration;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// In-memory store for testing
    #[derive(Default)]
    struct MockConfigStore {
        stored: Mutex<Option<SpamConfig>>,
        saves: Mutex<u32>,
        fail_saves: bool,
    }

    #[async_trait]
    impl SpamConfigStore for MockConfigStore {
        async fn load(&self) -> Result<SpamConfig, SpamError> {
            Ok(self.stored.lock().unwrap().clone().unwrap_or_default())
        }

        async fn save(&self, config: &SpamConfig) -> Result<(), SpamError> {
            *self.saves.lock().unwrap() += 1;
            if self.fail_saves {
                return Err(SpamError::StorageError("disk full".to_string()));
            }
            *self.stored.lock().unwrap() = Some(config.clone());
            Ok(())
        }
    }

    /// Store whose first save parks until released by the test
    #[derive(Default)]
    struct GatedConfigStore {
        inner: MockConfigStore,
        first_save_pending: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SpamConfigStore for GatedConfigStore {
        async fn load(&self) -> Result<SpamConfig, SpamError> {
            self.inner.load().await
        }

        async fn save(&self, config: &SpamConfig) -> Result<(), SpamError> {
            if self.first_save_pending.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.save(config).await
        }
    }

    fn at(secs: f64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
            + Duration::milliseconds((secs * 1000.0) as i64)
    }

    fn message(author_id: u64, text: &str, timestamp: DateTime<Utc>) -> InboundMessage {
        InboundMessage {
            message_id: 1,
            author_id,
            author_display_name: "spammer".to_string(),
            is_bot: false,
            guild_id: Some(456),
            channel_id: 789,
            text: text.to_string(),
            mentioned_user_ids: Vec::new(),
            timestamp,
            author_roles: vec!["Member".to_string()],
            is_guild_owner: false,
        }
    }

    async fn service() -> AntiSpamService<MockConfigStore> {
        AntiSpamService::new(MockConfigStore::default()).await
    }

    #[tokio::test]
    async fn test_normal_message_not_spam() {
        let service = service().await;
        let verdict = service.evaluate(&message(123, "Hello world!", at(0.0))).await;

        assert!(!verdict.should_sanction());
        assert!(verdict.reasons().is_empty());
    }

    #[tokio::test]
    async fn test_flood_detection_cites_count_and_window() {
        let service = service().await;

        for i in 0..5 {
            let verdict = service
                .evaluate(&message(123, &format!("message {}", i), at(i as f64 * 0.5)))
                .await;
            assert!(!verdict.should_sanction(), "Message {} should not be spam", i);
        }

        let verdict = service.evaluate(&message(123, "one too many", at(2.9))).await;

        assert!(verdict.should_sanction());
        let reason = &verdict.reasons()[0];
        assert!(reason.contains('6'), "{}", reason);
        assert!(reason.contains("10"), "{}", reason);
    }

    #[tokio::test]
    async fn test_flood_window_slides() {
        let service = service().await;

        for i in 0..5 {
            service
                .evaluate(&message(123, &format!("message {}", i), at(i as f64)))
                .await;
        }

        // The first message fell out of the 10 second window
        let verdict = service.evaluate(&message(123, "still fine", at(10.0))).await;
        assert!(!verdict.should_sanction());
    }

    #[tokio::test]
    async fn test_third_identical_message_is_duplicate() {
        let service = service().await;

        let first = service.evaluate(&message(123, "hello there", at(0.0))).await;
        let second = service.evaluate(&message(123, "hello there", at(1.0))).await;
        let third = service.evaluate(&message(123, "hello there", at(2.0))).await;

        assert!(!first.should_sanction());
        assert!(!second.should_sanction());
        assert_eq!(
            third.violations,
            vec![Violation::DuplicateMessage { threshold: 3 }]
        );
    }

    #[tokio::test]
    async fn test_interrupted_duplicates_not_flagged() {
        let service = service().await;

        service.evaluate(&message(123, "hello there", at(0.0))).await;
        service.evaluate(&message(123, "something else", at(1.0))).await;
        service.evaluate(&message(123, "hello there", at(2.0))).await;
        let verdict = service.evaluate(&message(123, "hello there", at(3.0))).await;

        assert!(!verdict.should_sanction());
    }

    #[tokio::test]
    async fn test_duplicates_remembered_for_twice_the_flood_window() {
        let service = service().await;

        service.evaluate(&message(123, "hello there", at(0.0))).await;
        service.evaluate(&message(123, "hello there", at(8.0))).await;
        let verdict = service.evaluate(&message(123, "hello there", at(19.0))).await;

        assert_eq!(
            verdict.violations,
            vec![Violation::DuplicateMessage { threshold: 3 }]
        );
    }

    #[tokio::test]
    async fn test_reason_order_is_rate_content_duplicate() {
        let service = service().await;

        for i in 0..5 {
            service
                .evaluate(&message(123, "buy now at discord.gg/x", at(i as f64 * 0.1)))
                .await;
        }
        let verdict = service
            .evaluate(&message(123, "buy now at discord.gg/x", at(0.6)))
            .await;

        assert!(matches!(
            verdict.violations.first(),
            Some(Violation::MessageFlood { count: 6, .. })
        ));
        assert!(matches!(
            verdict.violations.last(),
            Some(Violation::DuplicateMessage { .. })
        ));
        assert!(verdict.violations.contains(&Violation::UnauthorizedInvite));
    }

    #[tokio::test]
    async fn test_whitelisted_user_never_sanctioned_or_recorded() {
        let mut config = SpamConfig::default();
        config.whitelist_users.insert(99);
        let service = AntiSpamService::with_config(MockConfigStore::default(), config);

        for i in 0..10 {
            let verdict = service
                .evaluate(&message(99, "SPAM discord.gg/abc!!!!!!!!", at(i as f64 * 0.1)))
                .await;
            assert!(!verdict.should_sanction());
        }

        assert_eq!(service.windows.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_owner_and_role_exempt() {
        let service = service().await;

        let mut owner = message(1, "discord.gg/abc123", at(0.0));
        owner.is_guild_owner = true;
        assert!(!service.evaluate(&owner).await.should_sanction());

        let mut moderator = message(2, "discord.gg/abc123", at(0.0));
        moderator.author_roles.push("Moderator".to_string());
        assert!(!service.evaluate(&moderator).await.should_sanction());

        assert_eq!(service.windows.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_invite_link_flagged_without_block_list_entry() {
        let config = SpamConfig {
            blocked_domains: vec!["example.com".to_string()],
            ..Default::default()
        };
        let service = AntiSpamService::with_config(MockConfigStore::default(), config);

        let verdict = service
            .evaluate(&message(123, "come join discord.gg/abc123", at(0.0)))
            .await;

        assert_eq!(verdict.violations, vec![Violation::UnauthorizedInvite]);
    }

    #[tokio::test]
    async fn test_bots_and_direct_messages_ignored() {
        let service = service().await;

        let mut bot = message(1, "discord.gg/abc123", at(0.0));
        bot.is_bot = true;
        assert!(!service.evaluate(&bot).await.should_sanction());

        let mut dm = message(2, "discord.gg/abc123", at(0.0));
        dm.guild_id = None;
        assert!(!service.evaluate(&dm).await.should_sanction());

        assert_eq!(service.windows.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_mention_flood() {
        let service = service().await;

        let mut msg = message(123, "hey everyone", at(0.0));
        msg.mentioned_user_ids = (1..=5).collect();
        assert!(!service.evaluate(&msg).await.should_sanction());

        let mut msg = message(124, "hey everyone", at(0.0));
        msg.mentioned_user_ids = (1..=6).collect();
        assert_eq!(
            service.evaluate(&msg).await.violations,
            vec![Violation::MentionFlood { count: 6 }]
        );
    }

    #[tokio::test]
    async fn test_invalid_stored_config_falls_back_to_defaults() {
        let store = MockConfigStore::default();
        *store.stored.lock().unwrap() = Some(SpamConfig {
            dupe_threshold: 1,
            ..Default::default()
        });

        let service = AntiSpamService::new(store).await;
        assert_eq!(service.config().await.dupe_threshold, 3);
    }

    #[tokio::test]
    async fn test_whitelist_add_remove_list_persist() {
        let service = service().await;

        assert_eq!(
            service.apply_whitelist(WhitelistCommand::Add(7)).await.unwrap(),
            WhitelistOutcome::Added(7)
        );
        assert_eq!(
            service.apply_whitelist(WhitelistCommand::Add(7)).await.unwrap(),
            WhitelistOutcome::AlreadyListed(7)
        );
        assert_eq!(
            service.apply_whitelist(WhitelistCommand::List).await.unwrap(),
            WhitelistOutcome::Listed(vec![7])
        );
        assert_eq!(
            service.apply_whitelist(WhitelistCommand::Remove(8)).await.unwrap(),
            WhitelistOutcome::NotListed(8)
        );
        assert_eq!(
            service.apply_whitelist(WhitelistCommand::Remove(7)).await.unwrap(),
            WhitelistOutcome::Removed(7)
        );

        // Only the real changes hit the store
        assert_eq!(*service.store.saves.lock().unwrap(), 2);
        let stored = service.store.stored.lock().unwrap().clone().unwrap();
        assert!(stored.whitelist_users.is_empty());
    }

    #[tokio::test]
    async fn test_whitelist_save_failure_keeps_change() {
        let store = MockConfigStore {
            fail_saves: true,
            ..Default::default()
        };
        let service = AntiSpamService::new(store).await;

        assert!(service.apply_whitelist(WhitelistCommand::Add(7)).await.is_err());
        assert!(service.config().await.whitelist_users.contains(&7));
    }

    #[tokio::test]
    async fn test_overlapping_whitelist_adds_both_reach_disk() {
        let store = GatedConfigStore {
            first_save_pending: AtomicBool::new(true),
            ..Default::default()
        };
        let service = Arc::new(AntiSpamService::with_config(store, SpamConfig::default()));

        let first = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.apply_whitelist(WhitelistCommand::Add(7)).await }
        });
        service.store.entered.notified().await;

        let second = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.apply_whitelist(WhitelistCommand::Add(8)).await }
        });
        // Give the second add every chance to run ahead of the parked save
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        // Evaluation is not held up by the pending write
        assert!(!service
            .evaluate(&message(1, "still responsive", at(0.0)))
            .await
            .should_sanction());

        service.store.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), WhitelistOutcome::Added(7));
        assert_eq!(second.await.unwrap().unwrap(), WhitelistOutcome::Added(8));

        let in_memory = service.config().await.whitelist_users;
        let on_disk = service
            .store
            .inner
            .stored
            .lock()
            .unwrap()
            .clone()
            .unwrap()
            .whitelist_users;
        assert_eq!(in_memory, BTreeSet::from([7, 8]));
        assert_eq!(on_disk, in_memory);
    }

    #[tokio::test]
    async fn test_sweep_idle_releases_state() {
        let service = service().await;
        service.evaluate(&message(1, "hello there", at(0.0))).await;
        service.evaluate(&message(2, "hello there", at(50.0))).await;

        assert_eq!(service.sweep_idle(at(60.0)).await, 1);
        assert_eq!(service.windows.tracked_users(), 1);
    }
}
