// Implementations for the moderation system.

pub mod json_config_store;

pub use json_config_store::JsonSpamConfigStore;
