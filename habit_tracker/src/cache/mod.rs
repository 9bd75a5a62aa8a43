//! Cache abstraction used as the primary session store and for one-time
//! tokens.
//!
//! The backend is a small capability set rather than a concrete client:
//! string get/set-with-TTL/take/delete plus the set operations the
//! per-user session index needs. Production uses [`RedisCache`]; tests
//! and development wiring use [`InMemoryCache`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

pub mod sessions;
pub mod tokens;

pub use sessions::SessionStore;
pub use tokens::{PasswordResetTokenStore, VerificationTokenStore};

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend failure (connection, protocol)
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A cached record failed to (de)serialize
    #[error("cache codec error: {0}")]
    Codec(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache backend trait for pluggable storage
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a raw value
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a raw value with optional TTL
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// Atomically get and delete a value. Returns `None` if the key was
    /// absent (or already consumed by a racing caller).
    async fn take(&self, key: &str) -> CacheResult<Option<String>>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Check whether a key exists
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Add a member to a set
    async fn set_add(&self, key: &str, member: &str) -> CacheResult<()>;

    /// Remove a member from a set
    async fn set_remove(&self, key: &str, member: &str) -> CacheResult<()>;

    /// List all members of a set
    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;

    /// Set a key's TTL
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;
}

// ── In-memory backend ──

#[derive(Clone)]
struct StringEntry {
    value: String,
    expires_at: Option<std::time::Instant>,
}

impl StringEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| std::time::Instant::now() > at)
    }
}

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, StringEntry>,
    sets: HashMap<String, HashSet<String>>,
    set_expiry: HashMap<String, std::time::Instant>,
}

impl MemoryState {
    fn purge_expired_set(&mut self, key: &str) {
        if let Some(at) = self.set_expiry.get(key) {
            if std::time::Instant::now() > *at {
                self.sets.remove(key);
                self.set_expiry.remove(key);
            }
        }
    }
}

/// In-memory cache backed by a HashMap. Good for development and testing;
/// production should use [`RedisCache`].
#[derive(Clone)]
pub struct InMemoryCache {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache {
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let state = self.state.read().await;
        match state.strings.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(state);
                self.state.write().await.strings.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|d| std::time::Instant::now() + d);
        self.state.write().await.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn take(&self, key: &str) -> CacheResult<Option<String>> {
        let mut state = self.state.write().await;
        match state.strings.remove(key) {
            Some(entry) if entry.is_expired() => Ok(None),
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.state.write().await.strings.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let state = self.state.read().await;
        Ok(state.strings.get(key).is_some_and(|e| !e.is_expired()))
    }

    async fn set_add(&self, key: &str, member: &str) -> CacheResult<()> {
        let mut state = self.state.write().await;
        state.purge_expired_set(key);
        state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> CacheResult<()> {
        let mut state = self.state.write().await;
        if let Some(set) = state.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut state = self.state.write().await;
        state.purge_expired_set(key);
        Ok(state
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let mut state = self.state.write().await;
        let at = std::time::Instant::now() + ttl;
        if let Some(entry) = state.strings.get_mut(key) {
            entry.expires_at = Some(at);
        }
        if state.sets.contains_key(key) {
            state.set_expiry.insert(key.to_string(), at);
        }
        Ok(())
    }
}

// ── Redis backend ──

/// Redis-backed cache for production use.
///
/// Requires a connection URL (e.g., `redis://127.0.0.1:6379/0`).
pub struct RedisCache {
    conn: Arc<RwLock<redis::aio::MultiplexedConnection>>,
}

impl RedisCache {
    /// Create a new Redis cache from a connection URL
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(RedisCache {
            conn: Arc::new(RwLock::new(conn)),
        })
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        conn.get(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        match ttl {
            Some(ttl) => conn
                .set_ex(key, value, ttl.as_secs())
                .await
                .map_err(|e| CacheError::Backend(e.to_string())),
            None => conn
                .set(key, value)
                .await
                .map_err(|e| CacheError::Backend(e.to_string())),
        }
    }

    async fn take(&self, key: &str) -> CacheResult<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        conn.get_del(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        let count: i64 = conn
            .del(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(count > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        conn.exists(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set_add(&self, key: &str, member: &str) -> CacheResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        conn.sadd(key, member)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> CacheResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        conn.srem(key, member)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        conn.smembers(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.write().await;
        let _: bool = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }
}
