//! Queue worker - answers requests the bot drops into the request directory.
//!
//! Usage: cargo run --bin queue-worker [config.json]
//!
//! Without a config file, defaults and environment variables are used
//! (QUEUE_DIR, RESPONSES_DIR, POLL_INTERVAL, PROVIDER_TIMEOUT,
//! QWEN_CODE_API_URL, QWEN_CODE_CLI).

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use voxrelay::config::QueueConfig;
use voxrelay::queue::Consumer;

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match QueueConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let log_dir = std::env::var("LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = match voxrelay::logging::init(&log_dir, "queue-worker.log") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {e}");
            std::process::exit(1);
        }
    };

    let consumer = match Consumer::from_config(&config) {
        Ok(consumer) => consumer,
        Err(e) => {
            error!("Cannot build answer providers: {e}");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_signal(cancel.clone()));

    if let Err(e) = consumer.run(cancel).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

/// Cancel on Ctrl-C or SIGTERM.
async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received...");
    cancel.cancel();
}
