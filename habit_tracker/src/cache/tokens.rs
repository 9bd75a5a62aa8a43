//! One-time verification and password-reset token stores.
//!
//! Tokens are opaque 32-byte random strings (hex), stored in the cache
//! under a typed prefix with a bounded TTL and consumed exactly once:
//! `take` is an atomic get-and-delete, so two racing presenters cannot
//! both succeed.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use uuid::Uuid;

use super::{CacheBackend, CacheError, CacheResult};

const VERIFICATION_TOKEN_PREFIX: &str = "verification:token:";
const VERIFICATION_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const PASSWORD_RESET_TOKEN_PREFIX: &str = "password_reset:token:";
const PASSWORD_RESET_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Generate a 32-byte random token, hex encoded
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Email verification token store (24h TTL)
#[derive(Clone)]
pub struct VerificationTokenStore {
    cache: Arc<dyn CacheBackend>,
}

impl VerificationTokenStore {
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self { cache }
    }

    /// Issue a fresh token mapped to the user
    pub async fn issue(&self, user_id: Uuid) -> CacheResult<String> {
        let token = generate_token();
        let key = format!("{VERIFICATION_TOKEN_PREFIX}{token}");
        self.cache
            .set(&key, &user_id.to_string(), Some(VERIFICATION_TOKEN_TTL))
            .await?;
        Ok(token)
    }

    /// Consume a token, returning the user it was issued for.
    /// Returns `None` when absent, expired, or already consumed.
    pub async fn take(&self, token: &str) -> CacheResult<Option<Uuid>> {
        let key = format!("{VERIFICATION_TOKEN_PREFIX}{token}");
        match self.cache.take(&key).await? {
            Some(raw) => {
                let user_id = raw
                    .parse()
                    .map_err(|_| CacheError::Codec("malformed verification token value".into()))?;
                Ok(Some(user_id))
            }
            None => Ok(None),
        }
    }
}

/// Password reset token store (1h TTL). The value carries the email at
/// issuance so the changed-password event reports the address the reset
/// was requested for.
#[derive(Clone)]
pub struct PasswordResetTokenStore {
    cache: Arc<dyn CacheBackend>,
}

impl PasswordResetTokenStore {
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self { cache }
    }

    /// Issue a fresh token mapped to the user and their current email
    pub async fn issue(&self, user_id: Uuid, email: &str) -> CacheResult<String> {
        let token = generate_token();
        let key = format!("{PASSWORD_RESET_TOKEN_PREFIX}{token}");
        let value = format!("{user_id}|{email}");
        self.cache
            .set(&key, &value, Some(PASSWORD_RESET_TOKEN_TTL))
            .await?;
        Ok(token)
    }

    /// Consume a token, returning `(user_id, email_at_issuance)`.
    pub async fn take(&self, token: &str) -> CacheResult<Option<(Uuid, String)>> {
        let key = format!("{PASSWORD_RESET_TOKEN_PREFIX}{token}");
        match self.cache.take(&key).await? {
            Some(raw) => {
                let (user_part, email) = raw
                    .split_once('|')
                    .ok_or_else(|| CacheError::Codec("malformed reset token value".into()))?;
                let user_id = user_part
                    .parse()
                    .map_err(|_| CacheError::Codec("malformed reset token value".into()))?;
                Ok(Some((user_id, email.to_string())))
            }
            None => Ok(None),
        }
    }
}
