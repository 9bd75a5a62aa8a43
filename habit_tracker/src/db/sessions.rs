//! Session audit mirror repository.
//!
//! The cache is the source of truth for session liveness; rows here are a
//! durable audit trail. Inserts are issued best-effort by the session core
//! (a failed append never fails the originating request), deletes are part
//! of revocation.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::auth::{AuthResult, Session};

/// Trait for session audit operations
#[async_trait]
pub trait SessionAuditRepository: Send + Sync {
    /// Append a session row
    async fn create(&self, session: &Session) -> AuthResult<()>;

    /// List unexpired session rows for a user
    async fn find_active_by_user(&self, user_id: Uuid) -> AuthResult<Vec<Session>>;

    /// Delete one session row
    async fn delete(&self, session_id: Uuid) -> AuthResult<()>;

    /// Delete every session row of a user
    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<()>;
}

fn row_to_session(row: sqlx::postgres::PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
        last_activity_at: row.get("last_activity_at"),
    }
}

/// PostgreSQL implementation of [`SessionAuditRepository`]
pub struct PgSessionAuditRepository {
    pool: PgPool,
}

impl PgSessionAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionAuditRepository for PgSessionAuditRepository {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, ip_address, user_agent,
                                   expires_at, created_at, last_activity_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.last_activity_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> AuthResult<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT id, user_id, token_hash, ip_address, user_agent,
                    expires_at, created_at, last_activity_at
             FROM sessions
             WHERE user_id = $1 AND expires_at > NOW()
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_session).collect())
    }

    async fn delete(&self, session_id: Uuid) -> AuthResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory implementation for development wiring and tests
#[derive(Default)]
pub struct MemorySessionAuditRepository {
    sessions: std::sync::Mutex<std::collections::HashMap<Uuid, Session>>,
}

impl MemorySessionAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionAuditRepository for MemorySessionAuditRepository {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> AuthResult<Vec<Session>> {
        let now = chrono::Utc::now();
        let sessions = self.sessions.lock().expect("session map poisoned");
        let mut result: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.expires_at > now)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn delete(&self, session_id: Uuid) -> AuthResult<()> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .remove(&session_id);
        Ok(())
    }

    async fn delete_by_user(&self, user_id: Uuid) -> AuthResult<()> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .retain(|_, s| s.user_id != user_id);
        Ok(())
    }
}
