//! Cross-platform messaging ports (Telegram, Discord).

pub mod port;
pub mod throttled;
pub mod types;
