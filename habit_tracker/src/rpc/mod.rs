//! Typed error surface for the RPC façade.
//!
//! Every session-core and streak-engine error collapses into one of the
//! wire codes here; the ingress maps codes to HTTP statuses. Messages are
//! sanitized at conversion time, so nothing internal leaks past this
//! boundary.

use crate::auth::AuthError;
use crate::habits::HabitError;

/// Wire-level error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Client sent something malformed
    InvalidArgument,
    /// Unknown entity
    NotFound,
    /// Uniqueness collision (including per-period confirmation)
    AlreadyExists,
    /// Credential or token failure
    Unauthenticated,
    /// Cross-user access
    PermissionDenied,
    /// Anything else
    Internal,
}

/// An error as seen across the RPC boundary
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }
}

impl From<AuthError> for RpcError {
    fn from(err: AuthError) -> Self {
        let message = err.client_message();
        let code = match &err {
            AuthError::InvalidEmail(_)
            | AuthError::InvalidUsername(_)
            | AuthError::WeakPassword(_)
            | AuthError::InvalidTimezone(_)
            | AuthError::EmailAlreadyVerified => ErrorCode::InvalidArgument,

            AuthError::EmailTaken | AuthError::UsernameTaken => ErrorCode::AlreadyExists,

            AuthError::InvalidCredentials
            | AuthError::EmailNotVerified
            | AuthError::Jwt(_)
            | AuthError::WrongTokenType
            | AuthError::SessionNotFound
            | AuthError::InvalidToken => ErrorCode::Unauthenticated,

            AuthError::NotSessionOwner => ErrorCode::PermissionDenied,

            AuthError::UserNotFound => ErrorCode::NotFound,

            AuthError::Database(_) | AuthError::Cache(_) | AuthError::HashingFailed => {
                ErrorCode::Internal
            }
        };
        Self { code, message }
    }
}

impl From<HabitError> for RpcError {
    fn from(err: HabitError) -> Self {
        let message = err.client_message();
        let code = match &err {
            HabitError::NotFound => ErrorCode::NotFound,
            HabitError::AlreadyConfirmed => ErrorCode::AlreadyExists,
            HabitError::InvalidSchedule(_)
            | HabitError::InvalidTimezoneOffset(_)
            | HabitError::InvalidName(_) => ErrorCode::InvalidArgument,
            HabitError::Database(_) => ErrorCode::Internal,
        };
        Self { code, message }
    }
}
