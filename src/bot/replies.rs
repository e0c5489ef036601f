//! User-facing texts.

use crate::queue::record::{HistoryEntry, ROLE_USER};
use crate::queue::{Answer, SubmitError};

/// Max chars shown per entry in /history.
const HISTORY_PREVIEW_CHARS: usize = 100;
/// Entries shown by /history.
pub const HISTORY_SHOWN: usize = 10;

pub const PROCESSING: &str = "🤖 Processing your request...";
pub const TRANSCRIBING: &str = "🎤 Transcribing voice...";
pub const SENDING_VOICE_PROMPT: &str = "🤖 Sending to the code tool...";
pub const DOWNLOAD_FAILED: &str = "❌ Could not download the voice message. Please try again.";
pub const STT_FAILED: &str = "❌ Speech recognition failed.";
pub const STT_EMPTY: &str =
    "❌ Could not recognize any speech. Try again or send text instead.\n\nCheck /status to see whether a speech model is loaded.";
pub const STT_DISABLED: &str = "🎤 Voice messages are disabled: no speech model is configured. Send text instead.";
pub const ACCESS_DENIED: &str = "Access denied.";
pub const HISTORY_EMPTY: &str = "📭 History is empty. Send a voice or text request to start!";
pub const HISTORY_CLEARED: &str = "🗑 Conversation history cleared!";

pub fn start(first_name: &str) -> String {
    format!(
        "👋 Hi, {first_name}!\n\n\
         🤖 I relay your requests to the code tool.\n\n\
         • 🎤 Send a voice message and I'll transcribe it\n\
         • 📝 Or just type your request\n\
         • 📊 /history shows our recent conversation\n\n\
         🚀 Start by sending a message!"
    )
}

pub fn help() -> &'static str {
    "📖 How to use:\n\n\
     1. Voice: hold the microphone button, speak your request, send it. \
     I transcribe it and forward the text.\n\
     2. Text: type your request and send it.\n\n\
     Commands:\n\
     /start - Start the bot\n\
     /help - This help\n\
     /history - Recent conversation\n\
     /clear - Clear conversation history\n\
     /settings - Current settings\n\
     /status - System status"
}

pub fn history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return HISTORY_EMPTY.to_string();
    }
    let mut lines = vec!["📊 Conversation history:\n".to_string()];
    for entry in entries {
        let who = if entry.role == ROLE_USER { "👤 You" } else { "🤖 Tool" };
        lines.push(format!("{who}: {}", truncate_chars(&entry.content, HISTORY_PREVIEW_CHARS)));
    }
    lines.join("\n")
}

pub struct SettingsView<'a> {
    pub history_count: usize,
    pub stt_language: Option<&'a str>,
    pub stt_model: Option<&'a str>,
    pub queue_dir: &'a str,
}

pub fn settings(view: &SettingsView<'_>) -> String {
    format!(
        "⚙️ Settings:\n\n\
         • Stored messages: {}\n\
         • STT language: {}\n\
         • STT model: {}\n\
         • Queue: {}\n\n\
         /clear - clear history\n\
         /status - system status",
        view.history_count,
        view.stt_language.unwrap_or("-"),
        view.stt_model.unwrap_or("not configured"),
        view.queue_dir,
    )
}

pub struct StatusView<'a> {
    pub stt_loaded: bool,
    pub stt_configured: bool,
    /// None if the queue directories could not be read.
    pub counts: Option<(usize, usize)>,
    pub bot_username: Option<&'a str>,
}

pub fn status(view: &StatusView<'_>) -> String {
    let mut lines = vec!["🔍 System status:\n".to_string()];
    lines.push(match (view.stt_loaded, view.stt_configured) {
        (true, _) => "✅ Speech model: loaded".to_string(),
        (false, true) => "⚠️ Speech model: configured but not loaded".to_string(),
        (false, false) => "❌ Speech model: not configured".to_string(),
    });
    match view.counts {
        Some((requests, responses)) => {
            lines.push(format!("📁 Pending requests: {requests}"));
            lines.push(format!("📁 Waiting responses: {responses}"));
        }
        None => lines.push("❌ Queue directories unreadable".to_string()),
    }
    if let Some(name) = view.bot_username {
        lines.push(format!("🤖 Bot: @{name}"));
    }
    lines.join("\n")
}

pub fn transcribed(text: &str) -> String {
    format!("📝 Recognized: {text}")
}

/// What the user sees for the result of a queued request.
pub fn outcome(result: &Result<Answer, SubmitError>) -> String {
    match result {
        Ok(Answer::Completed(text)) if text.trim().is_empty() => {
            "🤖 The code tool returned an empty answer.".to_string()
        }
        Ok(Answer::Completed(text)) => format!("🤖 Code tool answer:\n\n{text}"),
        Ok(Answer::Failed(detail)) if detail.trim().is_empty() => {
            "❌ The code tool could not process the request.".to_string()
        }
        Ok(Answer::Failed(detail)) => format!("❌ The code tool reported an error: {detail}"),
        Err(SubmitError::Timeout { .. }) => {
            "⏳ The code tool took too long to answer. Make sure the queue worker is running.".to_string()
        }
        Err(SubmitError::Cancelled { .. }) => "❌ The request was cancelled.".to_string(),
        Err(SubmitError::Transport(_)) => "❌ Error while processing the request.".to_string(),
    }
}

pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
