//! Streak engine error types.

use thiserror::Error;

/// Streak engine errors
#[derive(Debug, Error)]
pub enum HabitError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Habit absent, inactive, or owned by someone else
    #[error("habit not found")]
    NotFound,

    /// A confirmation already exists for the current period
    #[error("habit already confirmed for current period")]
    AlreadyConfirmed,

    /// Schedule shape invalid (interval < 1, empty or out-of-range weekly set)
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Timezone offset outside [-12, +14]
    #[error("timezone offset {0} is outside the valid range -12..=14")]
    InvalidTimezoneOffset(i32),

    /// Name missing or too long
    #[error("invalid habit name: {0}")]
    InvalidName(String),
}

impl HabitError {
    /// Client-safe message; database detail never leaks.
    pub fn client_message(&self) -> String {
        match self {
            HabitError::Database(_) => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for streak engine operations
pub type HabitResult<T> = Result<T, HabitError>;
