//! Database query timeout helpers
//!
//! Provides timeout wrappers for store operations to prevent indefinite hangs.
//! Request-scoped operations get the short default; the sweeper uses the long
//! variant since a tick may touch many rows.

use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for store operations (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for request operations that fan out to several stores (10 seconds)
pub const REQUEST_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout budget for a full sweeper tick (5 minutes)
pub const SWEEPER_TICK_TIMEOUT: Duration = Duration::from_secs(300);

/// Error type for timeout operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError {
    /// Operation timed out
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for timeout operations
pub type TimeoutResult<T> = Result<T, TimeoutError>;

/// Execute a store operation with an explicit deadline
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> TimeoutResult<T>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(TimeoutError::Database(e)),
        Err(_) => Err(TimeoutError::Timeout(duration)),
    }
}

/// Execute a store operation with the default timeout (5 seconds)
pub async fn with_default_timeout<F, T>(future: F) -> TimeoutResult<T>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_constants() {
        assert_eq!(DEFAULT_QUERY_TIMEOUT.as_secs(), 5);
        assert_eq!(REQUEST_OPERATION_TIMEOUT.as_secs(), 10);
        assert_eq!(SWEEPER_TICK_TIMEOUT.as_secs(), 300);
    }

    #[tokio::test]
    async fn test_timeout_error_display() {
        let err = TimeoutError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("5s"));
    }

    #[tokio::test]
    async fn test_slow_operation_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, sqlx::Error>(42)
        };
        let result = with_timeout(Duration::from_millis(5), slow).await;
        assert!(matches!(result, Err(TimeoutError::Timeout(_))));
    }
}
