//! Update handlers: commands, text prompts and voice prompts.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use super::replies::{self, SettingsView, StatusView};
use super::telegram::TelegramClient;
use super::whisper::Whisper;
use crate::config::Config;
use crate::queue::{Answer, Producer};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "start the bot")]
    Start,
    #[command(description = "show help")]
    Help,
    #[command(description = "recent conversation")]
    History,
    #[command(description = "clear conversation history")]
    Clear,
    #[command(description = "current settings")]
    Settings,
    #[command(description = "system status")]
    Status,
}

pub struct BotState {
    pub config: Config,
    pub producer: Producer,
    pub telegram: TelegramClient,
    pub whisper: Option<Whisper>,
}

fn sender(msg: &Message) -> Option<(UserId, &str)> {
    msg.from.as_ref().map(|u| (u.id, u.first_name.as_str()))
}

/// Queue records carry signed ids; `None` if the Telegram id does not fit.
pub fn requester_id(user_id: UserId) -> Option<i64> {
    i64::try_from(user_id.0).ok()
}

pub async fn handle_command(msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    let Some((user_id, first_name)) = sender(&msg) else {
        return Ok(());
    };
    if !state.config.is_allowed(user_id) {
        state.telegram.send_text(msg.chat.id, replies::ACCESS_DENIED).await.ok();
        return Ok(());
    }

    let Some(requester) = requester_id(user_id) else {
        warn!("User id {} is out of range, ignoring /{:?}", user_id, cmd);
        return Ok(());
    };
    info!("/{:?} from {}", cmd, user_id);

    let text = match cmd {
        Command::Start => replies::start(first_name),
        Command::Help => replies::help().to_string(),
        Command::History => {
            let entries = state.producer.sessions().recent(requester, replies::HISTORY_SHOWN).await;
            replies::history(&entries)
        }
        Command::Clear => {
            state.producer.sessions().clear(requester).await;
            replies::HISTORY_CLEARED.to_string()
        }
        Command::Settings => {
            let history_count = state.producer.sessions().len(requester).await;
            let queue_dir = state.config.queue.request_dir.display().to_string();
            replies::settings(&SettingsView {
                history_count,
                stt_language: state.whisper.as_ref().map(|w| w.language()),
                stt_model: state.whisper.as_ref().map(|w| w.model_name()),
                queue_dir: &queue_dir,
            })
        }
        Command::Status => {
            let counts = match state.producer.dirs().counts().await {
                Ok(counts) => Some(counts),
                Err(e) => {
                    warn!("Failed to count queue files: {e}");
                    None
                }
            };
            let username = state.telegram.bot_username().await;
            replies::status(&StatusView {
                stt_loaded: state.whisper.is_some(),
                stt_configured: state.config.whisper_model_path.is_some(),
                counts,
                bot_username: username.as_deref(),
            })
        }
    };

    state.telegram.send_text(msg.chat.id, &text).await.ok();
    Ok(())
}

pub async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some((user_id, _)) = sender(&msg) else {
        return Ok(());
    };
    if !state.config.is_allowed(user_id) {
        info!("Message from non-allowed user {} - denial", user_id);
        state.telegram.send_text(msg.chat.id, replies::ACCESS_DENIED).await.ok();
        return Ok(());
    }
    let Some(requester) = requester_id(user_id) else {
        warn!("User id {} is out of range, ignoring message", user_id);
        return Ok(());
    };

    if msg.voice().is_some() {
        handle_voice(&msg, requester, &state).await;
    } else if let Some(text) = msg.text() {
        // Unknown commands are not prompts
        if text.starts_with('/') {
            return Ok(());
        }
        state.telegram.typing(msg.chat.id).await;
        let Ok(status_id) = state.telegram.send_text(msg.chat.id, replies::PROCESSING).await else {
            return Ok(());
        };
        relay(&state, msg.chat.id, status_id, text, requester).await;
    }

    Ok(())
}

async fn handle_voice(msg: &Message, requester: i64, state: &BotState) {
    let chat_id = msg.chat.id;
    let Some(voice) = msg.voice() else { return };

    let Some(whisper) = state.whisper.clone() else {
        state.telegram.send_text(chat_id, replies::STT_DISABLED).await.ok();
        return;
    };

    state.telegram.typing(chat_id).await;
    let audio = match state.telegram.download(&voice.file.id).await {
        Ok(audio) => audio,
        Err(e) => {
            error!("Voice download failed: {e}");
            state.telegram.send_text(chat_id, replies::DOWNLOAD_FAILED).await.ok();
            return;
        }
    };
    info!("Voice message from {}: {} bytes", requester, audio.len());

    let Ok(status_id) = state.telegram.send_text(chat_id, replies::TRANSCRIBING).await else {
        return;
    };

    let transcription = tokio::task::spawn_blocking(move || whisper.transcribe(&audio)).await;
    let text = match transcription {
        Ok(Ok(text)) if !text.trim().is_empty() => text,
        Ok(Ok(_)) => {
            state.telegram.edit_text(chat_id, status_id, replies::STT_EMPTY).await.ok();
            return;
        }
        Ok(Err(e)) => {
            error!("Transcription failed: {e}");
            state.telegram.edit_text(chat_id, status_id, replies::STT_FAILED).await.ok();
            return;
        }
        Err(e) => {
            error!("Transcription task panicked: {e}");
            state.telegram.edit_text(chat_id, status_id, replies::STT_FAILED).await.ok();
            return;
        }
    };

    // Keep the transcription visible and use a fresh status message
    state
        .telegram
        .edit_text(chat_id, status_id, &replies::transcribed(&text))
        .await
        .ok();
    let Ok(status_id) = state.telegram.send_text(chat_id, replies::SENDING_VOICE_PROMPT).await else {
        return;
    };

    relay(state, chat_id, status_id, &text, requester).await;
}

/// Queue the prompt and turn the status message into the outcome.
async fn relay(state: &BotState, chat_id: ChatId, status_id: MessageId, prompt: &str, requester: i64) {
    let result = state.producer.ask(prompt, requester).await;
    let text = replies::outcome(&result);

    match &result {
        Ok(Answer::Completed(_)) => {
            state.telegram.delete(chat_id, status_id).await.ok();
            state.telegram.send_text(chat_id, &text).await.ok();
        }
        Ok(Answer::Failed(detail)) => {
            warn!("Request from {} failed in worker: {}", requester, detail);
            state.telegram.edit_text(chat_id, status_id, &text).await.ok();
        }
        Err(e) => {
            warn!("Request from {} got no answer: {}", requester, e);
            state.telegram.edit_text(chat_id, status_id, &text).await.ok();
        }
    }
}
