use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors touching the queue directories.
#[derive(Debug)]
pub enum QueueError {
    /// Reading, writing, renaming or listing a path failed.
    Io { path: PathBuf, source: io::Error },
    /// A record file exists but is not a valid record.
    Parse { path: PathBuf, source: serde_json::Error },
    /// A record could not be serialized.
    Serialize(serde_json::Error),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "I/O error on '{}': {}", path.display(), source),
            Self::Parse { path, source } => {
                write!(f, "malformed record '{}': {}", path.display(), source)
            }
            Self::Serialize(e) => write!(f, "failed to serialize record: {e}"),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Serialize(source) => Some(source),
        }
    }
}

/// Why `submit_and_await` produced no answer.
///
/// A response record with `status = error` is *not* one of these: it comes
/// back as `Answer::Failed`.
#[derive(Debug)]
pub enum SubmitError {
    /// The request could not be written, or the response could not be read.
    Transport(QueueError),
    /// Nobody answered within the wait budget.
    Timeout { id: String, waited: Duration },
    /// The caller gave up before an answer arrived.
    Cancelled { id: String },
}

impl SubmitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "queue transport error: {e}"),
            Self::Timeout { id, waited } => {
                write!(f, "no response for request {id} after {}s", waited.as_secs())
            }
            Self::Cancelled { id } => write!(f, "request {id} cancelled"),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<QueueError> for SubmitError {
    fn from(e: QueueError) -> Self {
        Self::Transport(e)
    }
}
