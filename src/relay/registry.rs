use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::RelayError;
use super::id::SessionId;
use super::stats::{SessionCounters, SessionStats};

struct SessionEntry {
    sink: String,
    opened_at: DateTime<Utc>,
    counters: Arc<SessionCounters>,
}

/// Set of live sessions (session_id → bookkeeping)
///
/// The only state shared across connections; each connection task owns its
/// sink and touches the registry on connect, close, and status queries.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `id`; fails if a live session already holds it
    pub async fn register(
        &self,
        id: &SessionId,
        sink: String,
        counters: Arc<SessionCounters>,
    ) -> Result<(), RelayError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            return Err(RelayError::DuplicateSession(id.clone()));
        }

        sessions.insert(
            id.clone(),
            SessionEntry {
                sink,
                opened_at: Utc::now(),
                counters,
            },
        );
        Ok(())
    }

    /// Remove `id`; returns whether it was registered
    pub async fn deregister(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self, id: &SessionId) -> Option<SessionStats> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .map(|entry| SessionStats::capture(id, &entry.sink, entry.opened_at, &entry.counters))
    }

    /// Snapshot of all live sessions, oldest first
    pub async fn list(&self) -> Vec<SessionStats> {
        let sessions = self.sessions.read().await;
        let mut stats: Vec<SessionStats> = sessions
            .iter()
            .map(|(id, entry)| SessionStats::capture(id, &entry.sink, entry.opened_at, &entry.counters))
            .collect();
        stats.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        stats
    }
}
