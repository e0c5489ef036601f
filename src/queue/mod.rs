//! File-based request/response queue between the bot and the worker.
//!
//! The filesystem is the transport: the bot writes `<id>.json` into the
//! request directory and polls for `<id>.json` in the response directory.
//! Only one worker is expected, but claims are atomic renames so a second
//! one cannot double-process a request.

pub mod consumer;
pub mod dirs;
pub mod error;
pub mod producer;
pub mod provider;
pub mod record;
pub mod session;

pub use consumer::{Consumer, SweepStats};
pub use dirs::QueueDirs;
pub use error::{QueueError, SubmitError};
pub use producer::{Answer, Producer};
pub use provider::{AnswerProvider, CliProvider, FallbackProvider, HttpProvider, ProviderChain};
pub use record::{HistoryEntry, RequestRecord, ResponseRecord, ResponseStatus};
pub use session::SessionStore;
