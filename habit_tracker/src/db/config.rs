//! Database configuration.
//!
//! Only the knobs this service actually tunes. The library never reads
//! the environment; the binary's config layer assembles these values and
//! hands them over.

use std::time::Duration;

/// Connection-pool configuration.
///
/// Request handlers and the sweeper share one pool: handlers hold a
/// connection per store round trip, the sweeper holds one for its scan
/// each tick. `max_connections` caps both together, and
/// `min_connections` keeps enough warm that the minute tick never pays
/// a cold connect on an otherwise idle service.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Upper bound on the shared pool
    pub max_connections: u32,

    /// Connections kept warm between request bursts and sweeper ticks
    pub min_connections: u32,

    /// How long an operation may wait for a free connection before its
    /// caller observes a timeout
    pub acquire_timeout: Duration,

    /// Idle connections above the minimum are dropped after this
    pub idle_timeout: Duration,
}

impl DatabaseConfig {
    /// Sizing for a single-replica deployment: a small pool is plenty,
    /// since every operation is one short row-level round trip.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 16,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
        }
    }
}
