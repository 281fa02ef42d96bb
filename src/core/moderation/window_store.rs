// Per-user sliding windows backing flood and duplicate detection.
//
// Eviction is lazy: a user's buffers are only pruned when that user sends
// another message (or when the optional sweep runs).

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Anything that carries the time it was recorded.
pub trait Timestamped {
    fn recorded_at(&self) -> DateTime<Utc>;
}

impl Timestamped for DateTime<Utc> {
    fn recorded_at(&self) -> DateTime<Utc> {
        *self
    }
}

/// A normalized message body and when it was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentEvent {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Timestamped for ContentEvent {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Drop every entry for which `now - t >= horizon`, keeping order.
pub fn prune<T: Timestamped>(events: Vec<T>, now: DateTime<Utc>, horizon: Duration) -> Vec<T> {
    events
        .into_iter()
        .filter(|e| now - e.recorded_at() < horizon)
        .collect()
}

/// Duplicate matching is case-sensitive; only surrounding whitespace is ignored.
pub fn normalize(text: &str) -> &str {
    text.trim()
}

#[derive(Debug, Default)]
struct UserWindow {
    rate_events: Vec<DateTime<Utc>>,
    content_events: Vec<ContentEvent>,
}

impl UserWindow {
    fn record(&mut self, text: &str, timestamp: DateTime<Utc>) {
        self.rate_events.push(timestamp);
        self.content_events.push(ContentEvent {
            text: normalize(text).to_string(),
            timestamp,
        });
    }

    fn prune_rate(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        self.rate_events = prune(std::mem::take(&mut self.rate_events), now, window);
        // Entries stamped after `now` stay buffered but are not counted yet
        self.rate_events.iter().filter(|t| **t <= now).count()
    }

    fn prune_content(&mut self, now: DateTime<Utc>, window: Duration) -> &[ContentEvent] {
        self.content_events = prune(std::mem::take(&mut self.content_events), now, window);
        &self.content_events
    }

    fn is_empty(&self) -> bool {
        self.rate_events.is_empty() && self.content_events.is_empty()
    }
}

/// What one `observe` call saw for a user after recording and pruning.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    /// Messages inside the flood window, current one included
    pub rate_count: usize,
    /// Retained content, oldest first, current message last
    pub content: Vec<ContentEvent>,
}

/// Owns every user's windows, keyed by user id.
///
/// DashMap shards hold a write lock for the duration of an entry guard, so
/// two events for the same user never interleave their read-modify-write.
#[derive(Default)]
pub struct WindowStore {
    windows: DashMap<u64, UserWindow>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Append a message to the user's rate and content buffers.
    #[cfg(test)]
    fn record_event(&self, user_id: u64, text: &str, timestamp: DateTime<Utc>) {
        self.windows
            .entry(user_id)
            .or_default()
            .record(text, timestamp);
    }

    /// Evict stale rate entries and return how many remain.
    #[cfg(test)]
    fn prune_and_count_rate(&self, user_id: u64, now: DateTime<Utc>, window: Duration) -> usize {
        self.windows
            .get_mut(&user_id)
            .map(|mut w| w.prune_rate(now, window))
            .unwrap_or(0)
    }

    /// Evict stale content entries and return what remains, oldest first.
    #[cfg(test)]
    fn prune_and_get_content(
        &self,
        user_id: u64,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Vec<ContentEvent> {
        self.windows
            .get_mut(&user_id)
            .map(|mut w| w.prune_content(now, window).to_vec())
            .unwrap_or_default()
    }

    /// Record, prune and read back in one step under the user's entry lock.
    ///
    /// This is the only way production code touches a window: recording and
    /// both prunes happen under one guard, so a concurrent event for the same
    /// user sees either none or all of this update.
    pub fn observe(
        &self,
        user_id: u64,
        text: &str,
        now: DateTime<Utc>,
        rate_window: Duration,
        content_window: Duration,
    ) -> WindowSnapshot {
        let mut window = self.windows.entry(user_id).or_default();
        window.record(text, now);
        let rate_count = window.prune_rate(now, rate_window);
        let content = window.prune_content(now, content_window).to_vec();

        WindowSnapshot {
            rate_count,
            content,
        }
    }

    /// Prune every user against `horizon` and forget users left with nothing.
    ///
    /// Returns the number of users removed.
    pub fn sweep(&self, now: DateTime<Utc>, horizon: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window.prune_rate(now, horizon);
            window.prune_content(now, horizon);
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of users currently holding state.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}
