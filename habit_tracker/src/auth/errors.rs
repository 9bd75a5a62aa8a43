//! Identity and session error types.

use thiserror::Error;

use crate::cache::CacheError;

/// Identity and session errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cache error
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Password hashing failed
    #[error("password hashing failed")]
    HashingFailed,

    /// Credential check failed (user unknown, inactive, or wrong password)
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User exists but has not verified their email yet
    #[error("email not verified")]
    EmailNotVerified,

    /// Re-verification requested for an already verified address
    #[error("email already verified")]
    EmailAlreadyVerified,

    /// User not found
    #[error("user not found")]
    UserNotFound,

    /// Email already registered
    #[error("email already registered")]
    EmailTaken,

    /// Username already taken
    #[error("username already taken")]
    UsernameTaken,

    /// Invalid email format
    #[error("invalid email: {0}")]
    InvalidEmail(String),

    /// Invalid username format
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// Password too weak
    #[error("password too weak: {0}")]
    WeakPassword(String),

    /// Invalid timezone string
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// JWT token error
    #[error("token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// A token of the wrong type was presented to a validator
    #[error("wrong token type")]
    WrongTokenType,

    /// Session not found or expired
    #[error("session not found or expired")]
    SessionNotFound,

    /// Verification or reset token absent, consumed, or expired
    #[error("invalid or expired token")]
    InvalidToken,

    /// Session does not belong to the caller
    #[error("session does not belong to user")]
    NotSessionOwner,
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak internals.
    ///
    /// Database, cache, and JWT errors are sanitized; validation messages
    /// are surfaced verbatim.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::Cache(_) | AuthError::HashingFailed => {
                "internal server error".to_string()
            }
            AuthError::Jwt(_) | AuthError::WrongTokenType => "authentication failed".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for identity and session operations
pub type AuthResult<T> = Result<T, AuthError>;
