// Detection rules. Every rule is a pure function returning at most one finding.
//
// Content rules run in the fixed order of `CONTENT_CHECKS`, so the reasons a
// verdict carries always come out in the same sequence.

use super::moderation_models::{SpamConfig, Violation};
use super::window_store::{normalize, ContentEvent};

/// Messages shorter than this (after trimming) never count as duplicates.
pub const MIN_DUPLICATE_LEN: usize = 5;
/// Caps abuse is only judged on messages longer than this.
pub const MIN_CAPS_LEN: usize = 10;

const INVITE_MARKERS: [&str; 2] = ["discord.gg/", "discord.com/invite/"];

/// Everything a content rule may look at.
pub struct CheckContext<'a> {
    pub text: &'a str,
    pub mention_count: usize,
    pub author_exempt: bool,
    pub config: &'a SpamConfig,
}

pub type ContentCheck = fn(&CheckContext<'_>) -> Option<Violation>;

/// Content rules in evaluation order.
pub const CONTENT_CHECKS: [(&str, ContentCheck); 5] = [
    ("caps", check_caps),
    ("repeated_chars", check_repeated_chars),
    ("blocked_domain", check_blocked_domain),
    ("invite_link", check_invite_link),
    ("mention_flood", check_mention_flood),
];

/// Run every content rule and collect what fired.
pub fn evaluate_content(ctx: &CheckContext<'_>) -> Vec<Violation> {
    CONTENT_CHECKS
        .iter()
        .filter_map(|(name, check)| {
            let found = check(ctx);
            if found.is_some() {
                tracing::debug!(check = *name, "Content check fired");
            }
            found
        })
        .collect()
}

/// Flood: the pruned count already includes the current message.
pub fn check_rate(count: usize, threshold: u32, window_secs: u64) -> Option<Violation> {
    (count > threshold as usize).then_some(Violation::MessageFlood { count, window_secs })
}

/// Flag `text` when the messages right before it are already a run of
/// `dupe_threshold - 1` identical copies.
///
/// `preceding` is the retained history without the current message. Any
/// different message resets the streak.
pub fn check_duplicate(
    preceding: &[ContentEvent],
    text: &str,
    dupe_threshold: u32,
) -> Option<Violation> {
    let text = normalize(text);
    if text.chars().count() < MIN_DUPLICATE_LEN {
        return None;
    }

    let needed = dupe_threshold.saturating_sub(1) as usize;
    let mut run = 0usize;
    for event in preceding {
        if event.text == text {
            run += 1;
            if run >= needed {
                return Some(Violation::DuplicateMessage {
                    threshold: dupe_threshold,
                });
            }
        } else {
            run = 0;
        }
    }

    None
}

/// Upper-case letters divided by the full character count, punctuation included.
pub fn check_caps(ctx: &CheckContext<'_>) -> Option<Violation> {
    let len = ctx.text.chars().count();
    if len <= MIN_CAPS_LEN {
        return None;
    }

    let upper = ctx.text.chars().filter(|c| c.is_uppercase()).count();
    let ratio = upper as f64 / len as f64;

    (ratio > ctx.config.caps_ratio).then(|| Violation::ExcessiveCaps {
        percent: ratio * 100.0,
    })
}

pub fn check_repeated_chars(ctx: &CheckContext<'_>) -> Option<Violation> {
    let run = longest_run(ctx.text);
    (run > ctx.config.max_duplicate_chars as usize)
        .then_some(Violation::RepeatedCharacters { run_length: run })
}

pub fn check_blocked_domain(ctx: &CheckContext<'_>) -> Option<Violation> {
    let lowered = ctx.text.to_lowercase();
    ctx.config
        .blocked_domains
        .iter()
        .find(|domain| lowered.contains(&domain.to_lowercase()))
        .map(|domain| Violation::BlockedDomain {
            domain: domain.clone(),
        })
}

/// Invite links are checked even when no invite domain is in the block list.
pub fn check_invite_link(ctx: &CheckContext<'_>) -> Option<Violation> {
    if ctx.author_exempt {
        return None;
    }

    let lowered = ctx.text.to_lowercase();
    INVITE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
        .then_some(Violation::UnauthorizedInvite)
}

pub fn check_mention_flood(ctx: &CheckContext<'_>) -> Option<Violation> {
    (ctx.mention_count > ctx.config.mention_limit as usize).then_some(Violation::MentionFlood {
        count: ctx.mention_count,
    })
}

/// Longest run of one character. Line breaks never form a run.
fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if c == '\n' {
            current = 0;
            prev = None;
            continue;
        }
        current = if prev == Some(c) { current + 1 } else { 1 };
        prev = Some(c);
        longest = longest.max(current);
    }

    longest
}
