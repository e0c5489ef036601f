//! Telegram client using teloxide.

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, MessageId};
use tracing::{info, warn};

/// Telegram refuses messages longer than this.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Send/edit/delete/download, with errors flattened to strings.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send plain text, split into several messages if needed.
    /// Returns the id of the last message sent.
    pub async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageId, String> {
        let mut last = None;
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let sent = self.bot.send_message(chat_id, chunk).await.map_err(|e| {
                let msg = format!("Failed to send: {e}");
                warn!("{}", msg);
                msg
            })?;
            last = Some(sent.id);
        }
        last.ok_or_else(|| "Nothing to send".to_string())
    }

    pub async fn edit_text(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<(), String> {
        let text = split_message(text, MAX_MESSAGE_CHARS)
            .into_iter()
            .next()
            .unwrap_or_default();
        self.bot
            .edit_message_text(chat_id, message_id, text)
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to edit message: {e}");
                warn!("{}", msg);
                msg
            })
    }

    pub async fn delete(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), String> {
        self.bot
            .delete_message(chat_id, message_id)
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to delete message: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Best effort "typing..." indicator.
    pub async fn typing(&self, chat_id: ChatId) {
        if let Err(e) = self.bot.send_chat_action(chat_id, ChatAction::Typing).await {
            warn!("Failed to send chat action: {e}");
        }
    }

    pub async fn bot_username(&self) -> Option<String> {
        match self.bot.get_me().await {
            Ok(me) => Some(me.username().to_string()),
            Err(e) => {
                warn!("Failed to get bot info: {e}");
                None
            }
        }
    }

    /// Download a file (e.g. a voice note) by file_id.
    pub async fn download(&self, file_id: &FileId) -> Result<Vec<u8>, String> {
        let file = self
            .bot
            .get_file(file_id.clone())
            .await
            .map_err(|e| format!("Failed to get file info: {e}"))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| format!("Failed to download file: {e}"))?;

        info!("📥 Downloaded {} ({} bytes)", file.path, data.len());
        Ok(data)
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring
/// to break at a newline.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let end = match rest[..hard_end].rfind('\n') {
            Some(nl) if nl > 0 => nl + 1,
            _ => hard_end,
        };
        chunks.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
