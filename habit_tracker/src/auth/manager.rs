//! Session core implementation.
//!
//! Owns credential verification, token issuance, the dual session stores
//! (cache primary, durable mirror for audit), one-time token lifecycles,
//! and identity event emission. Event publication and audit-mirror writes
//! are best-effort; credential writes, confirmation of session liveness,
//! and revocation are authoritative.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use uuid::Uuid;

use crate::cache::{
    CacheBackend, PasswordResetTokenStore, SessionStore, VerificationTokenStore,
};
use crate::db::{SessionAuditRepository, UserRepository};
use crate::events::{EventPublisher, UserEvent};

use super::errors::{AuthError, AuthResult};
use super::models::{Session, TokenPair, User, UserCreate, UserUpdate};
use super::tokens::{hash_token, TokenManager};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;
const MAX_EMAIL_LENGTH: usize = 255;
const MAX_TIMEZONE_LENGTH: usize = 50;

/// Session core
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    session_audit: Arc<dyn SessionAuditRepository>,
    sessions: SessionStore,
    verification_tokens: VerificationTokenStore,
    reset_tokens: PasswordResetTokenStore,
    tokens: TokenManager,
    events: Arc<dyn EventPublisher>,
}

impl AuthManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        session_audit: Arc<dyn SessionAuditRepository>,
        cache: Arc<dyn CacheBackend>,
        tokens: TokenManager,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            users,
            session_audit,
            sessions: SessionStore::new(cache.clone()),
            verification_tokens: VerificationTokenStore::new(cache.clone()),
            reset_tokens: PasswordResetTokenStore::new(cache),
            tokens,
            events,
        }
    }

    /// Register a new user.
    ///
    /// Does not log the user in: a verification token is issued and the
    /// `UserRegistered` event carries it to the mailer. The next login
    /// requires the email to be verified.
    pub async fn register(
        &self,
        create: UserCreate,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<User> {
        validate_email(&create.email)?;
        validate_username(&create.username)?;
        validate_password(&create.password)?;
        validate_timezone(&create.timezone)?;

        if self.users.email_exists(&create.email).await? {
            return Err(AuthError::EmailTaken);
        }
        if self.users.username_exists(&create.username).await? {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = hash_password(&create.password)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            email: create.email,
            username: create.username,
            password_hash,
            first_name: create.first_name,
            timezone: create.timezone,
            is_active: true,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };

        self.users.create(&user).await?;

        let verification_token = self.verification_tokens.issue(user.id).await?;

        self.emit(UserEvent::UserRegistered {
            event_id: Uuid::now_v7(),
            occurred_at: now,
            user_id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone().unwrap_or_default(),
            verification_token,
            timezone: user.timezone.clone(),
            created_at: user.created_at,
        })
        .await;

        tracing::info!(
            user_id = %user.id,
            ip_address = ?ip_address,
            user_agent = ?user_agent,
            "user registered, verification pending"
        );

        Ok(user)
    }

    /// Authenticate by email or username and create a session
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<(User, TokenPair)> {
        let user = self
            .users
            .find_by_email_or_username(identifier)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        verify_password(password, &user.password_hash)?;

        let pair = self
            .create_session(user.id, ip_address, user_agent)
            .await?;
        Ok((user, pair))
    }

    /// Create a session: generate both tokens, write the cache record
    /// (authoritative), append the audit row (best-effort).
    async fn create_session(
        &self,
        user_id: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<TokenPair> {
        let session_id = Uuid::now_v7();

        let (access_token, access_expires_at) =
            self.tokens.generate_access_token(user_id, session_id)?;
        let (refresh_token, refresh_expires_at) =
            self.tokens.generate_refresh_token(user_id, session_id)?;

        let now = Utc::now();
        let session = Session {
            id: session_id,
            user_id,
            token_hash: hash_token(&refresh_token),
            ip_address,
            user_agent,
            expires_at: refresh_expires_at,
            created_at: now,
            last_activity_at: now,
        };

        self.sessions.put(&session).await?;

        if let Err(e) = self.session_audit.create(&session).await {
            tracing::warn!(session_id = %session_id, error = %e, "session audit append failed");
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Terminate one session after an ownership check
    pub async fn logout(&self, user_id: Uuid, session_id: Uuid) -> AuthResult<()> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.user_id != user_id {
            return Err(AuthError::NotSessionOwner);
        }

        self.sessions.delete(session_id).await?;
        self.session_audit.delete(session_id).await?;
        Ok(())
    }

    /// Exchange a refresh token for a new pair bound to the same session.
    ///
    /// The stored refresh-token hash rotates with the new token so the
    /// cache record keeps matching the newest credential.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims = self.tokens.validate_refresh_token(refresh_token)?;

        let session = self
            .sessions
            .get(claims.session_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        let (access_token, access_expires_at) = self
            .tokens
            .generate_access_token(session.user_id, session.id)?;
        let (new_refresh_token, refresh_expires_at) = self
            .tokens
            .generate_refresh_token(session.user_id, session.id)?;

        self.sessions
            .rotate_token(session.id, &hash_token(&new_refresh_token), refresh_expires_at)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate an access token and confirm its session is still live.
    ///
    /// The JWT alone is not enough: revocation is cache-backed, so a
    /// cryptographically valid token dies with its session.
    pub async fn validate_access(&self, access_token: &str) -> AuthResult<(Uuid, Uuid)> {
        let claims = self.tokens.validate_access_token(access_token)?;

        if !self.sessions.exists(claims.session_id).await? {
            return Err(AuthError::SessionNotFound);
        }

        if let Err(e) = self.sessions.touch(claims.session_id).await {
            tracing::warn!(session_id = %claims.session_id, error = %e, "session touch failed");
        }

        Ok((claims.user_id, claims.session_id))
    }

    /// Consume a verification token and mark the user verified.
    /// Verifying an already verified user succeeds (idempotent).
    pub async fn verify_email(&self, token: &str) -> AuthResult<User> {
        let user_id = self
            .verification_tokens
            .take(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.email_verified {
            return Ok(user);
        }

        let update = UserUpdate {
            email_verified: Some(true),
            ..Default::default()
        };
        self.users.update(user_id, &update).await
    }

    /// Re-issue a verification token for an unverified address
    pub async fn resend_verification(&self, email: &str) -> AuthResult<()> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.email_verified {
            return Err(AuthError::EmailAlreadyVerified);
        }

        let verification_token = self.verification_tokens.issue(user.id).await?;

        self.emit(UserEvent::EmailVerificationRequested {
            event_id: Uuid::now_v7(),
            occurred_at: Utc::now(),
            user_id: user.id,
            email: user.email.clone(),
            verification_token,
        })
        .await;

        Ok(())
    }

    /// Begin a password reset.
    ///
    /// Always reports success so the surface cannot be used to enumerate
    /// registered addresses; internally a token is issued only when the
    /// user exists.
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let user = match self.users.find_by_email(email).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "forgot-password lookup failed");
                return Ok(());
            }
        };

        let reset_token = match self.reset_tokens.issue(user.id, &user.email).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "reset token issue failed");
                return Ok(());
            }
        };

        self.emit(UserEvent::PasswordResetRequested {
            event_id: Uuid::now_v7(),
            occurred_at: Utc::now(),
            user_id: user.id,
            email: user.email.clone(),
            reset_token,
            requested_at: Utc::now(),
        })
        .await;

        Ok(())
    }

    /// Complete a password reset: consume the token, rewrite the hash,
    /// and revoke every session of that user.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        validate_password(new_password)?;

        let (user_id, email) = self
            .reset_tokens
            .take(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let password_hash = hash_password(new_password)?;
        self.users
            .update_password_hash(user_id, &password_hash)
            .await?;

        self.revoke_all_sessions(user_id).await?;

        self.emit(UserEvent::PasswordChanged {
            event_id: Uuid::now_v7(),
            occurred_at: Utc::now(),
            user_id,
            email,
            changed_at: Utc::now(),
            was_reset: true,
        })
        .await;

        Ok(())
    }

    /// Change the password of a logged-in user. Existing sessions stay
    /// alive; only the reset path forces global revocation.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        verify_password(old_password, &user.password_hash)?;
        validate_password(new_password)?;

        let password_hash = hash_password(new_password)?;
        self.users
            .update_password_hash(user_id, &password_hash)
            .await?;

        self.emit(UserEvent::PasswordChanged {
            event_id: Uuid::now_v7(),
            occurred_at: Utc::now(),
            user_id,
            email: user.email.clone(),
            changed_at: Utc::now(),
            was_reset: false,
        })
        .await;

        Ok(())
    }

    /// Current user's profile
    pub async fn get_profile(&self, user_id: Uuid) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Update mutable profile fields
    pub async fn update_profile(&self, user_id: Uuid, update: UserUpdate) -> AuthResult<User> {
        if let Some(timezone) = &update.timezone {
            validate_timezone(timezone)?;
        }
        self.users.update(user_id, &update).await
    }

    /// Soft-delete the account and revoke every live session
    pub async fn deactivate(&self, user_id: Uuid) -> AuthResult<()> {
        self.users.deactivate(user_id).await?;
        self.revoke_all_sessions(user_id).await?;
        Ok(())
    }

    /// All live sessions of a user, falling back to the audit mirror when
    /// the cache read fails.
    pub async fn get_user_sessions(&self, user_id: Uuid) -> AuthResult<Vec<Session>> {
        match self.sessions.get_by_user(user_id).await {
            Ok(sessions) => Ok(sessions),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "cache session listing failed, using audit mirror");
                self.session_audit.find_active_by_user(user_id).await
            }
        }
    }

    /// Revoke one session after an ownership check
    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> AuthResult<()> {
        self.logout(user_id, session_id).await
    }

    /// Revoke every session of a user, cache first, then the mirror.
    /// Returns how many cache entries were dropped.
    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> AuthResult<usize> {
        let count = self.sessions.delete_by_user(user_id).await?;
        self.session_audit.delete_by_user(user_id).await?;
        Ok(count)
    }

    /// Best-effort event emission: a publish failure logs a warning and
    /// never rolls back the originating action.
    async fn emit(&self, event: UserEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(event_type, error = %e, "event publish failed");
        }
    }
}

fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::HashingFailed)?
        .to_string())
}

fn verify_password(password: &str, hash: &str) -> AuthResult<()> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::InvalidEmail("email is required".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AuthError::InvalidEmail(format!(
            "email is too long (max {MAX_EMAIL_LENGTH} characters)"
        )));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail("invalid email format".to_string()));
    };
    if local.is_empty()
        || domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(AuthError::InvalidEmail("invalid email format".to_string()));
    }
    Ok(())
}

fn validate_username(username: &str) -> AuthResult<()> {
    let username = username.trim();
    if username.len() < MIN_USERNAME_LENGTH {
        return Err(AuthError::InvalidUsername(format!(
            "username must be at least {MIN_USERNAME_LENGTH} characters"
        )));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(AuthError::InvalidUsername(format!(
            "username is too long (max {MAX_USERNAME_LENGTH} characters)"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AuthError::InvalidUsername(
            "username can only contain letters, numbers, underscores and hyphens".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password is too long (max {MAX_PASSWORD_LENGTH} characters)"
        )));
    }
    Ok(())
}

fn validate_timezone(timezone: &str) -> AuthResult<()> {
    if timezone.is_empty() {
        return Err(AuthError::InvalidTimezone("timezone is required".to_string()));
    }
    if timezone.len() > MAX_TIMEZONE_LENGTH {
        return Err(AuthError::InvalidTimezone("timezone is too long".to_string()));
    }
    Ok(())
}
