// Moderation domain models - data structures for the anti-spam engine.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts live gateway objects into `InboundMessage`
// and turns a sanctioning `Verdict` into a real ban.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_SPAM_THRESHOLD: u32 = 5;
pub const DEFAULT_SPAM_TIME_WINDOW_SECS: u64 = 10;
pub const DEFAULT_DUPE_THRESHOLD: u32 = 3;
pub const DEFAULT_MENTION_LIMIT: u32 = 5;
pub const DEFAULT_CAPS_RATIO: f64 = 0.7;
pub const DEFAULT_MAX_DUPLICATE_CHARS: u32 = 5;

/// Detection thresholds plus the exemption lists.
///
/// Loaded once at startup; only the whitelist user set changes at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct SpamConfig {
    /// Maximum messages allowed per `spam_time_window_secs`
    pub spam_threshold: u32,
    /// Flood window in seconds (duplicate memory is twice this)
    pub spam_time_window_secs: u64,
    /// Consecutive identical messages that count as a duplicate run
    pub dupe_threshold: u32,
    /// Maximum user mentions allowed in a single message
    pub mention_limit: u32,
    /// Upper-case share of the message above which it counts as caps abuse
    pub caps_ratio: f64,
    /// Longest allowed run of one repeated character
    pub max_duplicate_chars: u32,
    /// Substrings matched case-insensitively against message text, in config order
    pub blocked_domains: Vec<String>,
    pub whitelist_roles: BTreeSet<String>,
    pub whitelist_users: BTreeSet<u64>,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            spam_threshold: DEFAULT_SPAM_THRESHOLD,
            spam_time_window_secs: DEFAULT_SPAM_TIME_WINDOW_SECS,
            dupe_threshold: DEFAULT_DUPE_THRESHOLD,
            mention_limit: DEFAULT_MENTION_LIMIT,
            caps_ratio: DEFAULT_CAPS_RATIO,
            max_duplicate_chars: DEFAULT_MAX_DUPLICATE_CHARS,
            blocked_domains: vec![
                "discord.gg/".to_string(),
                "discord.com/invite/".to_string(),
                "example.com".to_string(),
            ],
            whitelist_roles: ["Admin", "Moderator"]
                .into_iter()
                .map(String::from)
                .collect(),
            whitelist_users: BTreeSet::new(),
        }
    }
}

impl SpamConfig {
    /// Flood-detection window.
    pub fn rate_window(&self) -> Duration {
        Duration::seconds(self.spam_time_window_secs as i64)
    }

    /// Duplicate-detection retention, twice the flood window.
    pub fn content_window(&self) -> Duration {
        Duration::seconds(self.spam_time_window_secs.saturating_mul(2) as i64)
    }

    /// Replace every out-of-range value with its default.
    ///
    /// Returns the names of the fields that were reset so the caller can log them.
    pub fn sanitize(&mut self) -> Vec<&'static str> {
        let mut reset = Vec::new();

        if self.spam_threshold == 0 {
            self.spam_threshold = DEFAULT_SPAM_THRESHOLD;
            reset.push("spam_threshold");
        }
        // i64 seconds must not overflow once doubled
        if self.spam_time_window_secs == 0 || self.spam_time_window_secs > i64::MAX as u64 / 4 {
            self.spam_time_window_secs = DEFAULT_SPAM_TIME_WINDOW_SECS;
            reset.push("spam_time_window");
        }
        // A threshold of 1 would flag every message
        if self.dupe_threshold <= 1 {
            self.dupe_threshold = DEFAULT_DUPE_THRESHOLD;
            reset.push("dupe_threshold");
        }
        if self.mention_limit == 0 {
            self.mention_limit = DEFAULT_MENTION_LIMIT;
            reset.push("mention_limit");
        }
        if !(0.0..=1.0).contains(&self.caps_ratio) {
            self.caps_ratio = DEFAULT_CAPS_RATIO;
            reset.push("caps_ratio");
        }
        if self.max_duplicate_chars == 0 {
            self.max_duplicate_chars = DEFAULT_MAX_DUPLICATE_CHARS;
            reset.push("max_duplicate_chars");
        }

        let mut seen = BTreeSet::new();
        self.blocked_domains
            .retain(|d| !d.trim().is_empty() && seen.insert(d.to_lowercase()));

        reset
    }
}

/// One inbound chat message, already detached from the platform's object model.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: u64,
    pub author_id: u64,
    pub author_display_name: String,
    pub is_bot: bool,
    /// `None` for direct messages
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub text: String,
    pub mentioned_user_ids: Vec<u64>,
    pub timestamp: DateTime<Utc>,
    pub author_roles: Vec<String>,
    pub is_guild_owner: bool,
}

/// A single finding produced by one of the detectors.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Too many messages inside the flood window
    MessageFlood { count: usize, window_secs: u64 },
    /// Upper-case share above the configured ratio, as a percentage
    ExcessiveCaps { percent: f64 },
    /// A single character repeated past the allowed run length
    RepeatedCharacters { run_length: usize },
    BlockedDomain { domain: String },
    UnauthorizedInvite,
    MentionFlood { count: usize },
    /// Identical message repeated `threshold` or more times in a row
    DuplicateMessage { threshold: u32 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MessageFlood { count, window_secs } => {
                write!(f, "Message flood ({} messages in {}s)", count, window_secs)
            }
            Violation::ExcessiveCaps { percent } => {
                write!(f, "Excessive caps ({:.1}% upper-case)", percent)
            }
            Violation::RepeatedCharacters { run_length } => {
                write!(f, "Repeated characters ({} in a row)", run_length)
            }
            Violation::BlockedDomain { domain } => write!(f, "Blocked domain: {}", domain),
            Violation::UnauthorizedInvite => write!(f, "Unauthorized invite link"),
            Violation::MentionFlood { count } => write!(f, "Mention flood ({} mentions)", count),
            Violation::DuplicateMessage { threshold } => {
                write!(f, "Repeated identical message ({}+ in a row)", threshold)
            }
        }
    }
}

/// Outcome of evaluating one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    /// Findings in detection order
    pub violations: Vec<Violation>,
}

impl Verdict {
    /// A verdict with no findings.
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn should_sanction(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Human-readable reasons in detection order.
    pub fn reasons(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.to_string()).collect()
    }

    /// All reasons joined into one line, as used for the ban reason.
    pub fn reason_line(&self) -> String {
        self.reasons().join(", ")
    }

    /// Build the outbound request for the moderation executor.
    pub fn to_action(&self, message: &InboundMessage) -> ModerationAction {
        ModerationAction {
            kind: if self.should_sanction() {
                ActionKind::Ban
            } else {
                ActionKind::None
            },
            guild_id: message.guild_id,
            target_user_id: message.author_id,
            reason: self.reason_line(),
            originating_message_id: message.message_id,
            channel_id: message.channel_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    None,
    Ban,
}

/// Request handed to whatever performs the sanction on the remote platform.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationAction {
    pub kind: ActionKind,
    pub guild_id: Option<u64>,
    pub target_user_id: u64,
    pub reason: String,
    pub originating_message_id: u64,
    pub channel_id: u64,
}
