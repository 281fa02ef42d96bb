// Core moderation module - contains anti-spam business logic.
// Following the same pattern as the other core modules.

pub mod detectors;
pub mod moderation_models;
pub mod moderation_service;
pub mod whitelist;
pub mod window_store;

pub use moderation_models::*;
pub use moderation_service::*;
pub use whitelist::*;
