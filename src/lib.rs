//! voxrelay - Telegram voice/text relay to an external code tool.
//!
//! The bot and the worker never talk directly: the bot drops request
//! records into a directory and the worker answers them in another.

pub mod bot;
pub mod config;
pub mod logging;
pub mod queue;
