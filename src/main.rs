use std::sync::Arc;

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use voxrelay::bot::handlers::{handle_command, handle_message};
use voxrelay::bot::monitor::{spawn_queue_monitor, MONITOR_INTERVAL};
use voxrelay::bot::{BotState, Command, TelegramClient, Whisper};
use voxrelay::config::Config;
use voxrelay::queue::{Producer, SessionStore};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "voxrelay.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let _guard = match voxrelay::logging::init(&config.data_dir.join("logs"), "voxrelay.log") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {e}");
            std::process::exit(1);
        }
    };

    info!("🚀 Starting voxrelay...");
    info!("Loaded config from {config_path}");
    info!("Queue directory: {}", config.queue.request_dir.display());
    info!("Responses directory: {}", config.queue.response_dir.display());

    let dirs = config.queue.dirs();
    if let Err(e) = dirs.ensure().await {
        error!("Cannot create queue directories: {e}");
        std::process::exit(1);
    }

    let whisper = match &config.whisper_model_path {
        Some(path) => match Whisper::new(path, &config.whisper_language) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Voice messages disabled: {e}");
                None
            }
        },
        None => {
            info!("No whisper_model_path, voice messages disabled");
            None
        }
    };

    let shutdown = CancellationToken::new();
    let sessions = Arc::new(SessionStore::new(config.queue.history_window, config.queue.max_sessions));
    let producer = Producer::new(&config.queue, sessions).with_shutdown(shutdown.clone());

    spawn_queue_monitor(dirs, MONITOR_INTERVAL, shutdown.clone());

    let bot = Bot::new(&config.telegram_bot_token);
    let state = Arc::new(BotState {
        config,
        producer,
        telegram: TelegramClient::new(bot.clone()),
        whisper,
    });

    let handler = Update::filter_message()
        .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
        .branch(dptree::endpoint(handle_message));

    info!("Bot is running...");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    info!("Bot stopped");
}
