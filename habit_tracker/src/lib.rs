//! # Habit Tracker
//!
//! Server-side habit-tracking core: user identity with issued credentials,
//! session lifecycle, and a streak engine driven by per-habit deadlines in
//! the owner's local wall clock.
//!
//! ## Architecture
//!
//! Three internal components sit behind a typed surface the HTTP ingress
//! dispatches to:
//!
//! - **Identity store** ([`db`]): persistent CRUD on users, the
//!   authoritative source for uniqueness, plus session audit rows and
//!   habit/confirmation storage behind repository traits.
//! - **Session core** ([`auth`]): credential verification, linked JWT
//!   access/refresh tokens, cache-primary session state with a durable
//!   audit mirror, one-time verification/reset tokens, and identity event
//!   emission through [`events`].
//! - **Streak engine** ([`habits`]): per-habit deadlines in local time,
//!   at-most-one confirmation per period, and the background sweeper that
//!   demotes missed habits and rolls periods forward.
//!
//! The [`cache`] module abstracts the session/token cache behind a small
//! capability set with in-memory and Redis backends; [`rpc`] defines the
//! wire-level error codes the ingress maps to HTTP statuses.

/// Session core: authentication, tokens, session lifecycle.
pub mod auth;

/// Cache capability set with in-memory and Redis backends.
pub mod cache;

/// PostgreSQL pool, repository traits, and their implementations.
pub mod db;

/// Identity event bus publisher and wire format.
pub mod events;

/// Streak engine: habits, schedules, confirmations, sweeper.
pub mod habits;

/// Typed error surface for the RPC façade.
pub mod rpc;

pub use auth::{AuthError, AuthManager, AuthResult};
pub use habits::{DeadlineSweeper, HabitError, HabitManager, HabitResult};
pub use rpc::{ErrorCode, RpcError};
