//! Bot side of the queue: drop a request, wait for its response.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dirs::QueueDirs;
use super::error::{QueueError, SubmitError};
use super::record::{
    read_record, remove_if_exists, write_record, HistoryEntry, RequestRecord, ResponseRecord,
    ResponseStatus,
};
use super::session::SessionStore;
use crate::config::QueueConfig;

/// What came back for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Completed(String),
    /// The worker gave up; the detail is its diagnostic.
    Failed(String),
}

pub struct Producer {
    dirs: QueueDirs,
    poll_interval: Duration,
    max_wait: Duration,
    sessions: Arc<SessionStore>,
    shutdown: CancellationToken,
}

impl Producer {
    pub fn new(config: &QueueConfig, sessions: Arc<SessionStore>) -> Self {
        Self {
            dirs: config.dirs(),
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            sessions,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token abandons every wait in progress.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn dirs(&self) -> &QueueDirs {
        &self.dirs
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Submit with the requester's stored conversation as context.
    pub async fn ask(&self, payload: &str, requester_id: i64) -> Result<Answer, SubmitError> {
        let context = self.sessions.context(requester_id).await;
        self.submit_and_await(payload, requester_id, context).await
    }

    pub async fn submit_and_await(
        &self,
        payload: &str,
        requester_id: i64,
        context: Vec<HistoryEntry>,
    ) -> Result<Answer, SubmitError> {
        self.submit_with_cancel(payload, requester_id, context, &self.shutdown.child_token())
            .await
    }

    /// Like `submit_and_await`, but also gives up when `cancel` fires.
    pub async fn submit_with_cancel(
        &self,
        payload: &str,
        requester_id: i64,
        context: Vec<HistoryEntry>,
        cancel: &CancellationToken,
    ) -> Result<Answer, SubmitError> {
        let request = RequestRecord::new(requester_id, payload, context);
        let request_path = self.dirs.request_path(&request.id);
        let response_path = self.dirs.response_path(&request.id);

        write_record(&request_path, &request).await?;
        info!("Request {} queued for user {}", request.id, requester_id);

        let started = Instant::now();
        let deadline = started + self.max_wait;

        loop {
            let wake = (Instant::now() + self.poll_interval).min(deadline);
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.discard(&request_path).await;
                    info!("Request {} cancelled", request.id);
                    return Err(SubmitError::Cancelled { id: request.id });
                }
                _ = sleep_until(wake) => {}
            }

            match tokio::fs::try_exists(&response_path).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    self.discard(&request_path).await;
                    return Err(QueueError::Io { path: response_path, source: e }.into());
                }
            }

            if Instant::now() >= deadline {
                self.discard(&request_path).await;
                warn!("Timeout waiting for response {}", request.id);
                return Err(SubmitError::Timeout {
                    id: request.id,
                    waited: started.elapsed(),
                });
            }
            debug!("Still waiting for {}", request.id);
        }

        let response = read_record::<ResponseRecord>(&response_path).await;
        self.discard(&response_path).await;
        self.discard(&request_path).await;
        let response = response?;

        let answer = answer_from(response);
        if let Answer::Completed(text) = &answer {
            self.sessions.record_exchange(requester_id, payload, text).await;
        }
        info!("Response received for request {}", request.id);
        Ok(answer)
    }

    async fn discard(&self, path: &std::path::Path) {
        if let Err(e) = remove_if_exists(path).await {
            let e = QueueError::Io { path: path.to_path_buf(), source: e };
            warn!("Cleanup failed: {e}");
        }
    }
}

fn answer_from(response: ResponseRecord) -> Answer {
    match response.status {
        ResponseStatus::Completed => Answer::Completed(response.result.unwrap_or_default()),
        ResponseStatus::Error => Answer::Failed(
            response
                .error_detail
                .or(response.result)
                .unwrap_or_else(|| "unknown error".to_string()),
        ),
    }
}
