use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::UserId;

use crate::queue::QueueDirs;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// An environment override has a bad value.
    Env { var: &'static str, value: String },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Env { var, value } => write!(f, "invalid value for {}: '{}'", var, value),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Env { .. } | Self::Validation(_) => None,
        }
    }
}

/// Settings shared by the bot (producer) and the worker (consumer).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub request_dir: PathBuf,
    pub response_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// How long the bot waits for a response.
    pub max_wait_secs: u64,
    /// Bound on one CLI provider call.
    pub provider_timeout_secs: u64,
    /// Bound on one HTTP provider call.
    pub http_timeout_secs: u64,
    /// Remote answer endpoint. Tried first when set.
    pub provider_url: Option<String>,
    pub cli_program: String,
    pub cli_enabled: bool,
    pub fallback_enabled: bool,
    /// Entries of conversation sent along with each request.
    pub history_window: usize,
    /// Requesters whose conversation is kept in memory.
    pub max_sessions: usize,
    /// Unclaimed responses older than this are deleted by the worker.
    pub orphan_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            request_dir: PathBuf::from("/tmp/qwen_queue"),
            response_dir: PathBuf::from("/tmp/qwen_responses"),
            poll_interval_ms: 1000,
            max_wait_secs: 60,
            provider_timeout_secs: 120,
            http_timeout_secs: 60,
            provider_url: None,
            cli_program: "qwen-code".to_string(),
            cli_enabled: true,
            fallback_enabled: true,
            history_window: 10,
            max_sessions: 1000,
            orphan_ttl_secs: 600,
        }
    }
}

#[derive(Deserialize)]
struct QueueOnlyFile {
    #[serde(default)]
    queue: QueueConfig,
}

impl QueueConfig {
    /// Worker-side loading: the `queue` section of a config file if given,
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = read_file(path)?;
                let file: QueueOnlyFile = serde_json::from_str(&content)
                    .map_err(|e| ConfigError::ParseJson { path: path.to_path_buf(), source: e })?;
                file.queue
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply `QUEUE_DIR`-style overrides from any lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("QUEUE_DIR") {
            self.request_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("RESPONSES_DIR") {
            self.response_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("POLL_INTERVAL") {
            let secs: f64 = value
                .trim()
                .parse()
                .ok()
                .filter(|s: &f64| s.is_finite() && *s > 0.0)
                .ok_or_else(|| ConfigError::Env { var: "POLL_INTERVAL", value: value.clone() })?;
            self.poll_interval_ms = ((secs * 1000.0).round() as u64).max(1);
        }
        if let Some(value) = lookup("MAX_WAIT") {
            self.max_wait_secs = parse_secs("MAX_WAIT", &value)?;
        }
        if let Some(value) = lookup("PROVIDER_TIMEOUT") {
            self.provider_timeout_secs = parse_secs("PROVIDER_TIMEOUT", &value)?;
        }
        if let Some(url) = lookup("QWEN_CODE_API_URL") {
            let url = url.trim().to_string();
            self.provider_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(program) = lookup("QWEN_CODE_CLI") {
            self.cli_program = program;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation("poll_interval_ms must be positive".into()));
        }
        if self.max_wait_secs == 0 {
            return Err(ConfigError::Validation("max_wait_secs must be positive".into()));
        }
        if self.orphan_ttl_secs <= self.max_wait_secs {
            return Err(ConfigError::Validation(format!(
                "orphan_ttl_secs ({}) must be greater than max_wait_secs ({})",
                self.orphan_ttl_secs, self.max_wait_secs
            )));
        }
        if self.request_dir == self.response_dir {
            return Err(ConfigError::Validation(
                "request_dir and response_dir must be different directories".into(),
            ));
        }
        if self.cli_enabled && self.cli_program.trim().is_empty() {
            return Err(ConfigError::Validation("cli_program is empty but cli_enabled is set".into()));
        }
        Ok(())
    }

    pub fn dirs(&self) -> QueueDirs {
        QueueDirs::new(&self.request_dir, &self.response_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn orphan_ttl(&self) -> Duration {
        Duration::from_secs(self.orphan_ttl_secs)
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| ConfigError::Env { var, value: value.to_string() })
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Telegram users allowed to talk to the bot. Empty = everyone.
    #[serde(default)]
    allowed_users: Vec<u64>,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
    /// Path to Whisper model file (.bin) for voice transcription.
    whisper_model_path: Option<String>,
    /// Whisper language code, or "auto".
    whisper_language: Option<String>,
    #[serde(default)]
    queue: QueueConfig,
}

/// Bot configuration.
pub struct Config {
    pub telegram_bot_token: String,
    pub allowed_users: HashSet<UserId>,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub whisper_model_path: Option<PathBuf>,
    pub whisper_language: String,
    pub queue: QueueConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = read_file(&config_path)?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }

        let mut queue = file.queue;
        queue.apply_env()?;
        queue.validate()?;

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            allowed_users: file.allowed_users.into_iter().map(UserId).collect(),
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            whisper_model_path: file.whisper_model_path.map(PathBuf::from),
            whisper_language: file.whisper_language.unwrap_or_else(|| "auto".to_string()),
            queue,
        })
    }

    pub fn is_allowed(&self, user_id: UserId) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }
}
