//! Tests for the Telegram front end that need no network.
//!
//! Run with: cargo test bot

use std::time::Duration;

use teloxide::types::UserId;
use teloxide::utils::command::BotCommands;

use super::handlers::{requester_id, Command};
use super::replies::{self, SettingsView, StatusView};
use super::telegram::split_message;
use crate::queue::error::{QueueError, SubmitError};
use crate::queue::record::{HistoryEntry, ROLE_ASSISTANT, ROLE_USER};
use crate::queue::Answer;

// =============================================================================
// OUTCOME RENDERING TESTS
// =============================================================================

mod outcome {
    use super::*;

    #[test]
    fn test_success_is_verbatim() {
        let text = replies::outcome(&Ok(Answer::Completed("fn main() {}\n".into())));
        assert!(text.ends_with("fn main() {}\n"));
    }

    #[test]
    fn test_error_status_shows_detail() {
        let text = replies::outcome(&Ok(Answer::Failed("all answer providers failed".into())));
        assert!(text.contains("all answer providers failed"));
    }

    #[test]
    fn test_blank_error_gets_generic_line() {
        let text = replies::outcome(&Ok(Answer::Failed("  ".into())));
        assert!(text.contains("could not process"));
    }

    #[test]
    fn test_timeout_differs_from_failure() {
        let timeout = replies::outcome(&Err(SubmitError::Timeout {
            id: "x".into(),
            waited: Duration::from_secs(60),
        }));
        let transport = replies::outcome(&Err(SubmitError::Transport(QueueError::Io {
            path: "/tmp/x".into(),
            source: std::io::Error::other("disk full"),
        })));

        assert!(timeout.contains("took too long"));
        assert!(!transport.contains("took too long"));
        // Internal paths are not shown to users
        assert!(!transport.contains("/tmp/x"));
    }
}

// =============================================================================
// COMMAND TEXT TESTS
// =============================================================================

mod command_texts {
    use super::*;

    fn entry(role: &str, content: &str) -> HistoryEntry {
        HistoryEntry::new(role, content)
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(replies::history(&[]), replies::HISTORY_EMPTY);
    }

    #[test]
    fn test_history_labels_and_truncates() {
        let long = "x".repeat(150);
        let text = replies::history(&[entry(ROLE_USER, "hi"), entry(ROLE_ASSISTANT, &long)]);

        assert!(text.contains("👤 You: hi"));
        assert!(text.contains(&format!("🤖 Tool: {}...", "x".repeat(100))));
        assert!(!text.contains(&"x".repeat(101)));
    }

    #[test]
    fn test_start_greets_by_name() {
        assert!(replies::start("Alice").contains("Hi, Alice!"));
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = replies::help();
        for cmd in ["/start", "/help", "/history", "/clear", "/settings", "/status"] {
            assert!(help.contains(cmd), "help is missing {cmd}");
        }
    }

    #[test]
    fn test_settings() {
        let text = replies::settings(&SettingsView {
            history_count: 4,
            stt_language: Some("ru"),
            stt_model: None,
            queue_dir: "/tmp/qwen_queue",
        });
        assert!(text.contains("Stored messages: 4"));
        assert!(text.contains("STT language: ru"));
        assert!(text.contains("not configured"));
        assert!(text.contains("/tmp/qwen_queue"));
    }

    #[test]
    fn test_status() {
        let text = replies::status(&StatusView {
            stt_loaded: false,
            stt_configured: true,
            counts: Some((2, 1)),
            bot_username: Some("relay_bot"),
        });
        assert!(text.contains("configured but not loaded"));
        assert!(text.contains("Pending requests: 2"));
        assert!(text.contains("Waiting responses: 1"));
        assert!(text.contains("@relay_bot"));
    }

    #[test]
    fn test_status_unreadable_queue() {
        let text = replies::status(&StatusView {
            stt_loaded: true,
            stt_configured: true,
            counts: None,
            bot_username: None,
        });
        assert!(text.contains("✅ Speech model: loaded"));
        assert!(text.contains("unreadable"));
    }
}

// =============================================================================
// COMMAND PARSING TESTS
// =============================================================================

mod command_parsing {
    use super::*;

    #[test]
    fn test_parses_known_commands() {
        assert_eq!(Command::parse("/history", "relay_bot").unwrap(), Command::History);
        assert_eq!(Command::parse("/clear@relay_bot", "relay_bot").unwrap(), Command::Clear);
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Command::parse("/deploy", "relay_bot").is_err());
    }
}

// =============================================================================
// MESSAGE SPLITTING TESTS
// =============================================================================

mod splitting {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn test_prefers_newline_breaks() {
        let chunks = split_message("aaaa\nbbbb\ncc", 6);
        assert_eq!(chunks, vec!["aaaa\n", "bbbb\n", "cc"]);
    }

    #[test]
    fn test_hard_split_without_newlines() {
        let chunks = split_message(&"y".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), "y".repeat(25));
    }

    #[test]
    fn test_multibyte_chars_are_not_cut() {
        let text = "ж".repeat(9);
        let chunks = split_message(&text, 4);
        assert_eq!(chunks, vec!["жжжж", "жжжж", "ж"]);
    }
}

// =============================================================================
// REQUESTER ID TESTS
// =============================================================================

mod requester_ids {
    use super::*;

    #[test]
    fn test_telegram_ids_convert() {
        assert_eq!(requester_id(UserId(42)), Some(42));
        assert_eq!(requester_id(UserId(i64::MAX as u64)), Some(i64::MAX));
    }

    #[test]
    fn test_out_of_range_id_is_rejected() {
        assert_eq!(requester_id(UserId(u64::MAX)), None);
        assert_eq!(requester_id(UserId(1 << 63)), None);
    }
}
