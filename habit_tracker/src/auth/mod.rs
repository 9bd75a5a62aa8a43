//! Session core: credential verification, token issuance, session
//! lifecycle, and identity event emission.
//!
//! This module implements:
//! - Argon2id password hashing
//! - Linked JWT access/refresh tokens (HS256, type-checked validators)
//! - Dual session storage: cache as liveness authority, durable audit mirror
//! - One-time verification and reset tokens with bounded TTLs
//! - Forced global session revocation on password reset
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use habit_tracker::auth::{AuthManager, TokenConfig, TokenManager, UserCreate};
//! use habit_tracker::cache::InMemoryCache;
//! use habit_tracker::db::{MemorySessionAuditRepository, MemoryUserRepository};
//! use habit_tracker::events::MemoryEventBus;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = AuthManager::new(
//!         Arc::new(MemoryUserRepository::new()),
//!         Arc::new(MemorySessionAuditRepository::new()),
//!         Arc::new(InMemoryCache::new()),
//!         TokenManager::new(TokenConfig::new("jwt_secret", "habit-tracker")),
//!         Arc::new(MemoryEventBus::new()),
//!     );
//!
//!     let user = auth
//!         .register(
//!             UserCreate {
//!                 email: "player@example.com".to_string(),
//!                 username: "player1".to_string(),
//!                 password: "SecurePass123".to_string(),
//!                 first_name: None,
//!                 timezone: "Europe/Berlin".to_string(),
//!             },
//!             None,
//!             None,
//!         )
//!         .await?;
//!     println!("registered {}", user.username);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod tokens;

pub use errors::{AuthError, AuthResult};
pub use manager::AuthManager;
pub use models::{Claims, Session, TokenPair, TokenType, User, UserCreate, UserUpdate};
pub use tokens::{hash_token, TokenConfig, TokenManager};
