//! Worker side of the queue: claim requests, answer them, write responses.
//!
//! A request is claimed by renaming `<id>.json` to `<id>.json.claimed`.
//! The rename is atomic, so two workers can never both own one request.
//! Claiming also stamps the file's mtime; a claim only counts as abandoned
//! once it is older than the provider chain's worst case plus a grace
//! period, so a starting worker never steals a live worker's item.
//! A producer that times out deletes `<id>.json`; if the worker already
//! claimed it, the worker still answers and the response becomes an
//! orphan, which `reap_orphans` deletes once it is older than the TTL.

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dirs::{record_id, QueueDirs};
use super::error::QueueError;
use super::provider::ProviderChain;
use super::record::{read_record, remove_if_exists, write_record, RequestRecord, ResponseRecord};
use crate::config::QueueConfig;

/// How often orphaned responses and abandoned claims are looked for.
const ORPHAN_SWEEP_EVERY: Duration = Duration::from_secs(60);

/// Slack on top of the chain's worst case before a claim is abandoned.
const CLAIM_GRACE: Duration = Duration::from_secs(30);

/// What one pass over the request directory did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub answered: usize,
    pub errored: usize,
    /// Files that vanished before they could be claimed.
    pub skipped: usize,
}

enum Outcome {
    Answered,
    Errored,
    Skipped,
}

pub struct Consumer {
    dirs: QueueDirs,
    chain: ProviderChain,
    poll_interval: Duration,
    orphan_ttl: Duration,
    claim_ttl: Duration,
}

impl Consumer {
    pub fn new(dirs: QueueDirs, chain: ProviderChain, poll_interval: Duration, orphan_ttl: Duration) -> Self {
        let claim_ttl = chain.worst_case() + CLAIM_GRACE;
        Self {
            dirs,
            chain,
            poll_interval,
            orphan_ttl,
            claim_ttl,
        }
    }

    /// Age after which a claimed request is considered abandoned.
    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, String> {
        let chain = ProviderChain::from_config(config)?;
        Ok(Self::new(config.dirs(), chain, config.poll_interval(), config.orphan_ttl()))
    }

    pub fn dirs(&self) -> &QueueDirs {
        &self.dirs
    }

    /// Sweep until `cancel` fires. An item in progress is finished first.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), QueueError> {
        self.dirs.ensure().await?;
        info!("Queue worker started");
        info!("Request directory: {}", self.dirs.request_dir.display());
        info!("Response directory: {}", self.dirs.response_dir.display());
        info!("Providers: {:?}", self.chain.names());

        let recovered = self.recover_claims().await;
        if recovered > 0 {
            info!("Re-queued {} request(s) left claimed by a previous run", recovered);
        }

        let mut last_reap: Option<tokio::time::Instant> = None;

        while !cancel.is_cancelled() {
            match self.sweep(&cancel).await {
                Ok(stats) if stats != SweepStats::default() => info!("Sweep: {:?}", stats),
                Ok(_) => {}
                Err(e) => error!("Sweep failed: {e}"),
            }

            if last_reap.is_none_or(|t| t.elapsed() >= ORPHAN_SWEEP_EVERY) {
                if last_reap.is_some() {
                    let recovered = self.recover_claims().await;
                    if recovered > 0 {
                        info!("Re-queued {} abandoned claim(s)", recovered);
                    }
                }
                self.reap_orphans(self.orphan_ttl).await;
                last_reap = Some(tokio::time::Instant::now());
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.poll_interval) => {}
            }
        }

        info!("Queue worker stopped");
        Ok(())
    }

    /// Process every pending request once. Stops early if `cancel` fires
    /// between files.
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<SweepStats, QueueError> {
        let mut stats = SweepStats::default();

        for path in self.dirs.pending_requests().await? {
            if cancel.is_cancelled() {
                break;
            }
            match self.process(&path).await {
                Outcome::Answered => stats.answered += 1,
                Outcome::Errored => stats.errored += 1,
                Outcome::Skipped => stats.skipped += 1,
            }
        }

        Ok(stats)
    }

    async fn process(&self, path: &Path) -> Outcome {
        let Some(id) = record_id(path) else {
            return Outcome::Skipped;
        };
        let claimed = self.dirs.claimed_path(&id);

        match tokio::fs::rename(path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Request {} vanished before claim", id);
                return Outcome::Skipped;
            }
            Err(e) => {
                error!("Failed to claim {}: {}", path.display(), e);
                self.write_error(&id, None, &format!("claim failed: {e}")).await;
                if let Err(e) = remove_if_exists(path).await {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
                return Outcome::Errored;
            }
        }

        if let Err(e) = stamp_claim(&claimed).await {
            warn!("Failed to stamp claim {}: {}", claimed.display(), e);
        }

        let outcome = match self.answer(&id, &claimed).await {
            Ok(()) => Outcome::Answered,
            Err((requester_id, detail)) => {
                error!("Request {} failed: {}", id, detail);
                self.write_error(&id, requester_id, &detail).await;
                Outcome::Errored
            }
        };

        if let Err(e) = remove_if_exists(&claimed).await {
            warn!("Failed to remove {}: {}", claimed.display(), e);
        }
        outcome
    }

    /// Errors carry the requester (when known) and a short diagnostic.
    async fn answer(&self, id: &str, claimed: &Path) -> Result<(), (Option<i64>, String)> {
        let request: RequestRecord = read_record(claimed).await.map_err(|e| (None, e.to_string()))?;
        let requester_id = Some(request.requester_id);

        if request.id != id {
            warn!("Request file {} carries id {}, answering as {}", id, request.id, id);
        }
        info!("Processing request {} from user {}", id, request.requester_id);

        let answer = self
            .chain
            .answer(&request)
            .await
            .ok_or_else(|| (requester_id, "all answer providers failed".to_string()))?;

        let mut response = ResponseRecord::completed(&request, answer.text);
        response.id = id.to_string();
        write_record(&self.dirs.response_path(id), &response)
            .await
            .map_err(|e| (requester_id, e.to_string()))?;

        info!("Response written for request {} (via {})", id, answer.provider);
        Ok(())
    }

    async fn write_error(&self, id: &str, requester_id: Option<i64>, detail: &str) {
        let response = ResponseRecord::failed(id, requester_id, detail);
        if let Err(e) = write_record(&self.dirs.response_path(id), &response).await {
            error!("Failed to write error response for {}: {}", id, e);
        }
    }

    /// Move claims left by a crashed worker back into the queue. Claims
    /// younger than the claim TTL may belong to a live worker and stay.
    pub async fn recover_claims(&self) -> usize {
        let claimed = match self.dirs.claimed_requests().await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Failed to list claimed requests: {e}");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut recovered = 0;
        for path in claimed {
            let Some(id) = record_id(&path) else { continue };
            match file_age(&path, now).await {
                Some(age) if age >= self.claim_ttl => {}
                Some(_) => {
                    debug!("Claim {} is still fresh, leaving it", id);
                    continue;
                }
                None => continue,
            }
            match tokio::fs::rename(&path, self.dirs.request_path(&id)).await {
                Ok(()) => recovered += 1,
                Err(e) => warn!("Failed to re-queue {}: {}", path.display(), e),
            }
        }
        recovered
    }

    /// Delete responses nobody picked up within `ttl`. Returns how many.
    pub async fn reap_orphans(&self, ttl: Duration) -> usize {
        let responses = match self.dirs.responses().await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Failed to list responses: {e}");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut reaped = 0;
        for path in responses {
            let Some(age) = file_age(&path, now).await else { continue };
            if age < ttl {
                continue;
            }
            match remove_if_exists(&path).await {
                Ok(true) => {
                    info!("Removed orphaned response {} ({}s old)", path.display(), age.as_secs());
                    reaped += 1;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to remove orphan {}: {}", path.display(), e),
            }
        }
        reaped
    }
}

/// Set mtime to now, marking when the claim was taken.
async fn stamp_claim(path: &Path) -> io::Result<()> {
    let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.into_std().await.set_modified(SystemTime::now())
}

async fn file_age(path: &Path, now: SystemTime) -> Option<Duration> {
    let modified = tokio::fs::metadata(path).await.and_then(|m| m.modified()).ok()?;
    Some(now.duration_since(modified).unwrap_or_default())
}
