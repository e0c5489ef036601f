//! Layout of the request and response directories.

use std::path::{Path, PathBuf};

use super::error::QueueError;

pub const RECORD_EXT: &str = "json";
const RECORD_SUFFIX: &str = ".json";
const CLAIMED_SUFFIX: &str = ".json.claimed";

/// The two directories shared by bot and worker.
#[derive(Debug, Clone)]
pub struct QueueDirs {
    pub request_dir: PathBuf,
    pub response_dir: PathBuf,
}

impl QueueDirs {
    pub fn new(request_dir: impl Into<PathBuf>, response_dir: impl Into<PathBuf>) -> Self {
        Self {
            request_dir: request_dir.into(),
            response_dir: response_dir.into(),
        }
    }

    pub async fn ensure(&self) -> Result<(), QueueError> {
        for dir in [&self.request_dir, &self.response_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| QueueError::Io { path: dir.clone(), source: e })?;
        }
        Ok(())
    }

    pub fn request_path(&self, id: &str) -> PathBuf {
        self.request_dir.join(format!("{id}{RECORD_SUFFIX}"))
    }

    pub fn response_path(&self, id: &str) -> PathBuf {
        self.response_dir.join(format!("{id}{RECORD_SUFFIX}"))
    }

    /// Where a request lives while a worker is processing it.
    pub fn claimed_path(&self, id: &str) -> PathBuf {
        self.request_dir.join(format!("{id}{CLAIMED_SUFFIX}"))
    }

    /// Request files waiting to be claimed, in directory order.
    pub async fn pending_requests(&self) -> Result<Vec<PathBuf>, QueueError> {
        list_with_suffix(&self.request_dir, RECORD_SUFFIX).await
    }

    /// Requests a worker claimed but never finished.
    pub async fn claimed_requests(&self) -> Result<Vec<PathBuf>, QueueError> {
        list_with_suffix(&self.request_dir, CLAIMED_SUFFIX).await
    }

    pub async fn responses(&self) -> Result<Vec<PathBuf>, QueueError> {
        list_with_suffix(&self.response_dir, RECORD_SUFFIX).await
    }

    /// (pending requests, waiting responses).
    pub async fn counts(&self) -> Result<(usize, usize), QueueError> {
        Ok((self.pending_requests().await?.len(), self.responses().await?.len()))
    }
}

/// The request id a record or claimed file belongs to.
pub fn record_id(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(CLAIMED_SUFFIX)
        .or_else(|| name.strip_suffix(RECORD_SUFFIX))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Hidden files (in-progress writes) are never listed.
async fn list_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, QueueError> {
    let io_err = |e| QueueError::Io { path: dir.to_path_buf(), source: e };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') || !name.ends_with(suffix) {
            continue;
        }
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            paths.push(entry.path());
        }
    }

    Ok(paths)
}
