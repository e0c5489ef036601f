//! Telegram front end - turns messages into queued requests.

pub mod handlers;
pub mod monitor;
pub mod replies;
pub mod telegram;
pub mod whisper;

#[cfg(test)]
mod tests;

pub use handlers::{BotState, Command};
pub use telegram::TelegramClient;
pub use whisper::Whisper;
