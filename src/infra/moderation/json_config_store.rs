use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;

use crate::core::moderation::{SpamConfig, SpamConfigStore, SpamError};

/// On-disk shape of the anti-spam config. Field names are shared with
/// other tooling, so they must not change.
#[derive(Debug, Serialize, Deserialize)]
struct SpamConfigDocument {
    spam_threshold: u32,
    spam_time_window: u64,
    dupe_threshold: u32,
    mention_limit: u32,
    caps_ratio: f64,
    max_duplicate_chars: u32,
    blocked_domains: Vec<String>,
    whitelist_roles: Vec<String>,
    /// User ids are stored as strings
    whitelist_users: Vec<String>,
}

impl From<&SpamConfig> for SpamConfigDocument {
    fn from(config: &SpamConfig) -> Self {
        Self {
            spam_threshold: config.spam_threshold,
            spam_time_window: config.spam_time_window_secs,
            dupe_threshold: config.dupe_threshold,
            mention_limit: config.mention_limit,
            caps_ratio: config.caps_ratio,
            max_duplicate_chars: config.max_duplicate_chars,
            blocked_domains: config.blocked_domains.clone(),
            whitelist_roles: config.whitelist_roles.iter().cloned().collect(),
            whitelist_users: config
                .whitelist_users
                .iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }
}

/// JSON file store for the anti-spam config.
///
/// Reading is lenient: each field that is missing or has the wrong type
/// falls back to its default on its own.
pub struct JsonSpamConfigStore {
    path: PathBuf,
}

impl JsonSpamConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SpamConfigStore for JsonSpamConfigStore {
    async fn load(&self) -> Result<SpamConfig, SpamError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No anti-spam config found, using defaults");
            return Ok(SpamConfig::default());
        }

        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| SpamError::StorageError(e.to_string()))?;

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(fields)) => Ok(config_from_fields(&fields)),
            Ok(_) => Err(SpamError::ConfigError(
                "config root must be a JSON object".to_string(),
            )),
            Err(e) => Err(SpamError::ConfigError(e.to_string())),
        }
    }

    async fn save(&self, config: &SpamConfig) -> Result<(), SpamError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SpamError::StorageError(e.to_string()))?;
        }

        let text = serde_json::to_string_pretty(&SpamConfigDocument::from(config))
            .map_err(|e| SpamError::StorageError(e.to_string()))?;
        fs::write(&self.path, text)
            .await
            .map_err(|e| SpamError::StorageError(e.to_string()))
    }
}

/// Build a config field by field, keeping the default for anything unusable.
fn config_from_fields(fields: &Map<String, Value>) -> SpamConfig {
    let defaults = SpamConfig::default();

    SpamConfig {
        spam_threshold: field(fields, "spam_threshold", defaults.spam_threshold),
        spam_time_window_secs: field(fields, "spam_time_window", defaults.spam_time_window_secs),
        dupe_threshold: field(fields, "dupe_threshold", defaults.dupe_threshold),
        mention_limit: field(fields, "mention_limit", defaults.mention_limit),
        caps_ratio: field(fields, "caps_ratio", defaults.caps_ratio),
        max_duplicate_chars: field(fields, "max_duplicate_chars", defaults.max_duplicate_chars),
        blocked_domains: field(fields, "blocked_domains", defaults.blocked_domains),
        whitelist_roles: field(fields, "whitelist_roles", defaults.whitelist_roles),
        whitelist_users: user_ids(fields, defaults.whitelist_users),
    }
}

fn field<T: serde::de::DeserializeOwned>(fields: &Map<String, Value>, name: &str, default: T) -> T {
    let Some(value) = fields.get(name) else {
        tracing::info!(field = name, "Anti-spam config value missing, using default");
        return default;
    };

    match T::deserialize(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(field = name, "Malformed anti-spam config value, using default: {}", e);
            default
        }
    }
}

/// Ids may be written as strings (the canonical form) or bare numbers.
fn user_ids(fields: &Map<String, Value>, default: BTreeSet<u64>) -> BTreeSet<u64> {
    let Some(value) = fields.get("whitelist_users") else {
        tracing::info!(field = "whitelist_users", "Anti-spam config value missing, using default");
        return default;
    };
    let Some(entries) = value.as_array() else {
        tracing::warn!(field = "whitelist_users", "Malformed anti-spam config value, using default");
        return default;
    };

    entries
        .iter()
        .filter_map(|entry| {
            let id = match entry {
                Value::String(s) => s.trim().parse::<u64>().ok(),
                Value::Number(n) => n.as_u64(),
                _ => None,
            };
            if id.is_none() {
                tracing::warn!(entry = %entry, "Skipping invalid whitelisted user id");
            }
            id
        })
        .collect()
}
