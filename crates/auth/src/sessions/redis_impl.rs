//! Redis session storage implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use authgate_core::auth::{AuthError, Result, SessionId, SessionStore};
use fred::prelude::*;

/// Redis-backed session storage.
///
/// Each browser session is one JSON object under `auth_session:{id}`,
/// rewritten with a fresh TTL on every `set`.
pub struct RedisSessionStore {
    pool: Pool,
    ttl: Duration,
}

impl RedisSessionStore {
    /// Creates a new Redis session store.
    ///
    /// # Arguments
    ///
    /// * `pool` - Redis connection pool
    /// * `ttl` - TTL applied after every write
    pub fn new(pool: Pool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Connects a pool of `pool_size` clients to `url`.
    pub async fn connect(url: &str, pool_size: usize, ttl: Duration) -> Result<Self> {
        let config = Config::from_url(url).map_err(|e| AuthError::Storage(e.to_string()))?;
        let pool = Builder::from_config(config)
            .build_pool(pool_size)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        pool.init()
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        tracing::info!(pool_size, "Connected Redis session store");
        Ok(Self::new(pool, ttl))
    }

    fn session_key(id: &SessionId) -> String {
        format!("auth_session:{}", id)
    }

    async fn load(&self, key: &str) -> Result<HashMap<String, String>> {
        let value: Option<String> = self
            .pool
            .get(key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        match value {
            Some(json) => serde_json::from_str(&json).map_err(|e| AuthError::Storage(e.to_string())),
            None => Ok(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, session: &SessionId, key: &str) -> Result<Option<String>> {
        let mut values = self.load(&Self::session_key(session)).await?;
        Ok(values.remove(key))
    }

    async fn set(&self, session: &SessionId, key: &str, value: &str) -> Result<()> {
        let redis_key = Self::session_key(session);

        // Read-modify-write; concurrent writes to one session are last-writer-wins.
        let mut values = self.load(&redis_key).await?;
        values.insert(key.to_string(), value.to_string());

        let json = serde_json::to_string(&values).map_err(|e| AuthError::Storage(e.to_string()))?;
        let ttl_secs = i64::try_from(self.ttl.as_secs().max(1)).unwrap_or(i64::MAX);

        self.pool
            .set::<(), _, _>(&redis_key, &json, Some(Expiration::EX(ttl_secs)), None, false)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, session: &SessionId) -> Result<()> {
        self.pool
            .del::<(), _>(&Self::session_key(session))
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        Ok(())
    }
}
