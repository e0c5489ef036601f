//! Request and response records and their on-disk form.
//!
//! Records are pretty-printed JSON. Writes go to a hidden temp file in the
//! same directory and are renamed into place, so a poller only ever sees
//! complete records.

use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::error::QueueError;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// One prior turn of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            timestamp: now_timestamp(),
        }
    }
}

/// One unit of work, written by the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    #[serde(rename = "user_id")]
    pub requester_id: i64,
    #[serde(rename = "prompt")]
    pub payload: String,
    /// Oldest first.
    #[serde(rename = "history", default)]
    pub context: Vec<HistoryEntry>,
    #[serde(rename = "timestamp")]
    pub created_at: String,
}

impl RequestRecord {
    /// New request with a fresh UUID v4 id.
    pub fn new(requester_id: i64, payload: impl Into<String>, context: Vec<HistoryEntry>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requester_id,
            payload: payload.into(),
            context,
            created_at: now_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Error,
}

/// Result of one request, written by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    /// Unknown when the request itself could not be parsed.
    #[serde(rename = "user_id", default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<i64>,
    #[serde(
        rename = "response",
        alias = "answer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<String>,
    #[serde(rename = "timestamp")]
    pub completed_at: String,
    pub status: ResponseStatus,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ResponseRecord {
    pub fn completed(request: &RequestRecord, result: impl Into<String>) -> Self {
        Self {
            id: request.id.clone(),
            requester_id: Some(request.requester_id),
            result: Some(result.into()),
            completed_at: now_timestamp(),
            status: ResponseStatus::Completed,
            error_detail: None,
        }
    }

    pub fn failed(id: impl Into<String>, requester_id: Option<i64>, detail: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            requester_id,
            result: None,
            completed_at: now_timestamp(),
            status: ResponseStatus::Error,
            error_detail: Some(detail.into()),
        }
    }
}

/// Local time, RFC 3339.
pub fn now_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Serialize `record` to `path` atomically (temp file + rename).
pub async fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<(), QueueError> {
    let json = serde_json::to_vec_pretty(record).map_err(QueueError::Serialize)?;
    let temp = temp_path_for(path);

    tokio::fs::write(&temp, &json)
        .await
        .map_err(|e| QueueError::Io { path: temp.clone(), source: e })?;

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(QueueError::Io { path: path.to_path_buf(), source: e });
    }

    debug!("Wrote {} ({} bytes)", path.display(), json.len());
    Ok(())
}

pub async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T, QueueError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| QueueError::Io { path: path.to_path_buf(), source: e })?;
    serde_json::from_slice(&bytes).map_err(|e| QueueError::Parse { path: path.to_path_buf(), source: e })
}

/// Delete a record file. A file that is already gone is not an error.
///
/// Returns whether a file was actually removed.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_request_wire_names() {
        let req = RequestRecord::new(42, "2+2", vec![HistoryEntry::new(ROLE_USER, "hi")]);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["user_id"], 42);
        assert_eq!(json["prompt"], "2+2");
        assert_eq!(json["history"][0]["role"], "user");
        assert_eq!(json["history"][0]["content"], "hi");
        assert!(json["timestamp"].is_string());
        assert!(Uuid::parse_str(json["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_request_without_history_parses() {
        let raw = r#"{"id":"abc","user_id":7,"prompt":"hello","timestamp":"2024-01-15T10:30:00"}"#;
        let req: RequestRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(req.requester_id, 7);
        assert!(req.context.is_empty());
    }

    #[test]
    fn test_error_response_shape() {
        let resp = ResponseRecord::failed("abc", None, "bad json");
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "bad json");
        assert!(json.get("response").is_none());
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn test_completed_response_omits_error() {
        let req = RequestRecord::new(1, "q", vec![]);
        let resp = ResponseRecord::completed(&req, "a");
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["status"], "completed");
        assert_eq!(json["response"], "a");
        assert_eq!(json["id"], req.id.as_str());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_answer_alias_accepted() {
        let raw = r#"{"id":"x","answer":"42","timestamp":"t","status":"completed"}"#;
        let resp: ResponseRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.result.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.json");
        let req = RequestRecord::new(1, "привет", vec![]);

        write_record(&path, &req).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["abc.json".to_string()]);

        // Non-ASCII stays readable in the file
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("привет"));

        let back: RequestRecord = read_record(&path).await.unwrap();
        assert_eq!(back, req);
    }

    #[tokio::test]
    async fn test_read_malformed_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = read_record::<RequestRecord>(&path).await.unwrap_err();
        assert!(matches!(err, QueueError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.json");
        std::fs::write(&path, "{}").unwrap();

        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!remove_if_exists(&path).await.unwrap());
    }
}
