//! Per-requester conversation memory.
//!
//! Each requester keeps at most `window` entries. At most `max_requesters`
//! sessions are kept; a new requester beyond that evicts the one that was
//! least recently active.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;
use tracing::debug;

use super::record::{HistoryEntry, ROLE_ASSISTANT, ROLE_USER};

struct Session {
    entries: VecDeque<HistoryEntry>,
    last_active: u64,
}

struct Sessions {
    map: HashMap<i64, Session>,
    /// Logical clock for recency.
    tick: u64,
}

pub struct SessionStore {
    window: usize,
    max_requesters: usize,
    inner: Mutex<Sessions>,
}

impl SessionStore {
    pub fn new(window: usize, max_requesters: usize) -> Self {
        Self {
            window,
            max_requesters: max_requesters.max(1),
            inner: Mutex::new(Sessions {
                map: HashMap::new(),
                tick: 0,
            }),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// The context window for the next request, oldest first.
    pub async fn context(&self, requester_id: i64) -> Vec<HistoryEntry> {
        self.recent(requester_id, self.window).await
    }

    /// The last `n` entries, oldest first.
    pub async fn recent(&self, requester_id: i64, n: usize) -> Vec<HistoryEntry> {
        let inner = self.inner.lock().await;
        match inner.map.get(&requester_id) {
            Some(session) => {
                let skip = session.entries.len().saturating_sub(n);
                session.entries.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Remember a completed prompt/answer pair.
    pub async fn record_exchange(&self, requester_id: i64, prompt: &str, answer: &str) {
        let mut inner = self.inner.lock().await;
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.map.contains_key(&requester_id) && inner.map.len() >= self.max_requesters {
            let oldest = inner
                .map
                .iter()
                .min_by_key(|(_, s)| s.last_active)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                debug!("Evicting session for requester {}", id);
                inner.map.remove(&id);
            }
        }

        let session = inner.map.entry(requester_id).or_insert_with(|| Session {
            entries: VecDeque::new(),
            last_active: tick,
        });
        session.last_active = tick;
        session.entries.push_back(HistoryEntry::new(ROLE_USER, prompt));
        session.entries.push_back(HistoryEntry::new(ROLE_ASSISTANT, answer));
        while session.entries.len() > self.window {
            session.entries.pop_front();
        }
    }

    /// Forget a requester. Returns whether there was anything to forget.
    pub async fn clear(&self, requester_id: i64) -> bool {
        self.inner.lock().await.map.remove(&requester_id).is_some()
    }

    /// Number of stored entries for a requester.
    pub async fn len(&self, requester_id: i64) -> usize {
        self.inner
            .lock()
            .await
            .map
            .get(&requester_id)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.map.len()
    }
}
