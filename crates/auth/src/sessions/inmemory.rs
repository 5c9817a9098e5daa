//! In-memory session storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use authgate_core::auth::{is_token_expired, Result, SessionId, SessionStore};

#[derive(Debug, Clone)]
struct Entry {
    values: HashMap<String, String>,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory session store for development, tests and single-node servers.
///
/// Values live in a `HashMap` wrapped in `Arc<RwLock<_>>`; clones share the
/// same data. Every write pushes the session's expiry `ttl` into the future.
/// Expired sessions read as empty and are dropped by `purge_expired`.
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    entries: Arc<RwLock<HashMap<SessionId, Entry>>>,
    ttl: chrono::Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(crate::DEFAULT_SESSION_TTL)
    }
}

impl InMemorySessionStore {
    /// Creates a new empty store whose sessions expire `ttl` after their last write.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Removes every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !is_token_expired(entry.expires_at, now));
        before - entries.len()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|entry| !is_token_expired(entry.expires_at, now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// `None` when the TTL overflows, which means the session never expires.
    fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.ttl)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session: &SessionId, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(session)
            .filter(|entry| !is_token_expired(entry.expires_at, Utc::now()))
            .and_then(|entry| entry.values.get(key).cloned()))
    }

    async fn set(&self, session: &SessionId, key: &str, value: &str) -> Result<()> {
        let now = Utc::now();
        let expires_at = self.expiry_from(now);
        let mut entries = self.entries.write().await;

        let entry = entries.entry(session.clone()).or_insert_with(|| Entry {
            values: HashMap::new(),
            expires_at,
        });
        if is_token_expired(entry.expires_at, now) {
            entry.values.clear();
        }
        entry.values.insert(key.to_string(), value.to_string());
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn delete(&self, session: &SessionId) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(session);
        Ok(())
    }
}
