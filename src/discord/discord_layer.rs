// Discord layer - commands and event handlers.

#[path = "moderation/mod.rs"]
pub mod moderation;

// Re-export shared types for convenience
pub use moderation::{Context, Data, Error};
