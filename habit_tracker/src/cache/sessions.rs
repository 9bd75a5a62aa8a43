//! Primary session store.
//!
//! A session exists here iff its refresh credential is valid; the durable
//! mirror only audits. Three key families:
//!
//! - `session:<id>` — the serialized session record, TTL = refresh expiry
//! - `token:<hash>` — refresh-token hash to session id, same TTL
//! - `user:<id>:sessions` — set of the user's live session ids

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::{CacheBackend, CacheError, CacheResult};
use crate::auth::Session;

/// Slack added to the per-user session set's TTL so the index outlives
/// its newest member.
const USER_SET_TTL_SLACK: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn CacheBackend>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self { cache }
    }

    fn session_key(session_id: Uuid) -> String {
        format!("session:{session_id}")
    }

    fn token_key(token_hash: &str) -> String {
        format!("token:{token_hash}")
    }

    fn user_sessions_key(user_id: Uuid) -> String {
        format!("user:{user_id}:sessions")
    }

    /// Store a session with TTL equal to its remaining lifetime
    pub async fn put(&self, session: &Session) -> CacheResult<()> {
        let remaining = (session.expires_at - Utc::now()).num_seconds();
        if remaining <= 0 {
            return Err(CacheError::Codec("session already expired".into()));
        }
        let ttl = Duration::from_secs(remaining as u64);

        let data = serde_json::to_string(session).map_err(|e| CacheError::Codec(e.to_string()))?;
        self.cache
            .set(&Self::session_key(session.id), &data, Some(ttl))
            .await?;
        self.cache
            .set(
                &Self::token_key(&session.token_hash),
                &session.id.to_string(),
                Some(ttl),
            )
            .await?;

        let user_key = Self::user_sessions_key(session.user_id);
        self.cache.set_add(&user_key, &session.id.to_string()).await?;
        self.cache.expire(&user_key, ttl + USER_SET_TTL_SLACK).await?;
        Ok(())
    }

    /// Fetch a live session by id
    pub async fn get(&self, session_id: Uuid) -> CacheResult<Option<Session>> {
        match self.cache.get(&Self::session_key(session_id)).await? {
            Some(data) => {
                let session =
                    serde_json::from_str(&data).map_err(|e| CacheError::Codec(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Whether a session is live
    pub async fn exists(&self, session_id: Uuid) -> CacheResult<bool> {
        self.cache.exists(&Self::session_key(session_id)).await
    }

    /// All live sessions of a user. Dead ids found in the set are pruned
    /// as a side effect.
    pub async fn get_by_user(&self, user_id: Uuid) -> CacheResult<Vec<Session>> {
        let user_key = Self::user_sessions_key(user_id);
        let ids = self.cache.set_members(&user_key).await?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id_str in ids {
            let Ok(session_id) = id_str.parse::<Uuid>() else {
                self.cache.set_remove(&user_key, &id_str).await?;
                continue;
            };
            match self.get(session_id).await? {
                Some(session) => sessions.push(session),
                None => {
                    self.cache.set_remove(&user_key, &id_str).await?;
                }
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Refresh the session's activity timestamp, re-storing the record
    pub async fn touch(&self, session_id: Uuid) -> CacheResult<()> {
        let Some(mut session) = self.get(session_id).await? else {
            return Ok(());
        };
        session.touch();
        self.put(&session).await
    }

    /// Replace the stored refresh-token hash after a rotation, dropping
    /// the old token mapping.
    pub async fn rotate_token(
        &self,
        session_id: Uuid,
        new_token_hash: &str,
        new_expires_at: chrono::DateTime<Utc>,
    ) -> CacheResult<Option<Session>> {
        let Some(mut session) = self.get(session_id).await? else {
            return Ok(None);
        };
        self.cache
            .delete(&Self::token_key(&session.token_hash))
            .await?;
        session.token_hash = new_token_hash.to_string();
        session.expires_at = new_expires_at;
        session.touch();
        self.put(&session).await?;
        Ok(Some(session))
    }

    /// Remove one session and its related keys
    pub async fn delete(&self, session_id: Uuid) -> CacheResult<()> {
        let Some(session) = self.get(session_id).await? else {
            return Ok(());
        };
        self.cache.delete(&Self::session_key(session_id)).await?;
        self.cache
            .delete(&Self::token_key(&session.token_hash))
            .await?;
        self.cache
            .set_remove(
                &Self::user_sessions_key(session.user_id),
                &session_id.to_string(),
            )
            .await?;
        Ok(())
    }

    /// Remove every session of a user. Returns how many were dropped.
    pub async fn delete_by_user(&self, user_id: Uuid) -> CacheResult<usize> {
        let sessions = self.get_by_user(user_id).await?;
        let count = sessions.len();
        for session in &sessions {
            self.delete(session.id).await?;
        }
        self.cache
            .delete(&Self::user_sessions_key(user_id))
            .await?;
        Ok(count)
    }
}
