//! Database module: connection pool and startup readiness.
//!
//! The pool is built lazily, so constructing a [`Database`] never blocks
//! on the server being up; callers gate startup on
//! [`Database::wait_until_ready`] instead. That ordering matters here
//! because the deadline sweeper starts ticking as soon as it is spawned —
//! its first scan must find a database that answers, not a connect error
//! it would misread as "no habits due".
//!
//! The repository traits the managers are built against live in the
//! submodules.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

pub mod config;
pub mod habits;
pub mod sessions;
pub mod timeouts;
pub mod users;

pub use config::DatabaseConfig;
pub use habits::{
    ConfirmationRepository, HabitRepository, MemoryConfirmationRepository, MemoryHabitRepository,
    PgConfirmationRepository, PgHabitRepository,
};
pub use sessions::{MemorySessionAuditRepository, PgSessionAuditRepository, SessionAuditRepository};
pub use users::{MemoryUserRepository, PgUserRepository, UserRepository};

/// Retry ceiling for the readiness backoff
const MAX_READY_BACKOFF: Duration = Duration::from_secs(5);

/// Database handle owning the shared connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Build the pool without touching the server.
    ///
    /// Fails only on a malformed URL; actual connections are opened on
    /// first use or by [`Self::wait_until_ready`].
    pub fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect_lazy(&config.database_url)?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One round trip to the server
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Block until the database answers a ping, retrying with doubling
    /// backoff up to `max_attempts`. Returns the last ping error when
    /// every attempt fails.
    pub async fn wait_until_ready(&self, max_attempts: u32) -> Result<(), sqlx::Error> {
        let attempts = max_attempts.max(1);
        let mut delay = Duration::from_millis(200);

        for attempt in 1..=attempts {
            match self.ping().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt == attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "database not ready, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_READY_BACKOFF);
                }
            }
        }
        unreachable!("loop returns on the final attempt")
    }

    /// Close the connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
