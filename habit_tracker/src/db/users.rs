//! User repository: persistent CRUD on users and the authoritative source
//! for uniqueness checks.
//!
//! Inactive users are excluded from every lookup; callers cannot observe
//! soft-deleted rows. No hashing happens here — the session core owns
//! credentials and hands this layer opaque hashes.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::auth::{AuthError, AuthResult, User, UserUpdate};

/// Trait for user repository operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a new user. Fails with `EmailTaken`/`UsernameTaken` on
    /// uniqueness collisions.
    async fn create(&self, user: &User) -> AuthResult<()>;

    /// Find an active user by id
    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<User>>;

    /// Find an active user by email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Find an active user by username
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Find an active user by email, falling back to username
    async fn find_by_email_or_username(&self, identifier: &str) -> AuthResult<Option<User>> {
        match self.find_by_email(identifier).await? {
            Some(user) => Ok(Some(user)),
            None => self.find_by_username(identifier).await,
        }
    }

    /// Update mutable fields (display name, timezone, verified flag)
    async fn update(&self, user_id: Uuid, update: &UserUpdate) -> AuthResult<User>;

    /// Rewrite the credential hash
    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> AuthResult<()>;

    /// Soft-delete: set `is_active = false`
    async fn deactivate(&self, user_id: Uuid) -> AuthResult<()>;

    /// Cheap existence probe by email (active rows only)
    async fn email_exists(&self, email: &str) -> AuthResult<bool>;

    /// Cheap existence probe by username (active rows only)
    async fn username_exists(&self, username: &str) -> AuthResult<bool>;
}

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, timezone, \
     is_active, email_verified, created_at, updated_at";

fn row_to_user(row: sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        timezone: row.get("timezone"),
        is_active: row.get("is_active"),
        email_verified: row.get("email_verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL implementation of [`UserRepository`]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> AuthResult<()> {
        let result = sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, first_name, timezone,
                                is_active, email_verified, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.timezone)
        .bind(user.is_active)
        .bind(user.email_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // Constraint name tells us which uniqueness failed
                match db_err.constraint() {
                    Some(c) if c.contains("email") => Err(AuthError::EmailTaken),
                    _ => Err(AuthError::UsernameTaken),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND is_active = TRUE"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_user))
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND is_active = TRUE"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_user))
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND is_active = TRUE"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_user))
    }

    async fn update(&self, user_id: Uuid, update: &UserUpdate) -> AuthResult<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET
                first_name = COALESCE($1, first_name),
                timezone = COALESCE($2, timezone),
                email_verified = COALESCE($3, email_verified),
                updated_at = NOW()
             WHERE id = $4 AND is_active = TRUE
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&update.first_name)
        .bind(&update.timezone)
        .bind(update.email_verified)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).ok_or(AuthError::UserNotFound)
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> AuthResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = NOW()
             WHERE id = $2 AND is_active = TRUE",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn deactivate(&self, user_id: Uuid) -> AuthResult<()> {
        let result = sqlx::query(
            "UPDATE users SET is_active = FALSE, updated_at = NOW()
             WHERE id = $1 AND is_active = TRUE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND is_active = TRUE)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<bool, _>(0))
    }

    async fn username_exists(&self, username: &str) -> AuthResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND is_active = TRUE)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<bool, _>(0))
    }
}

/// In-memory implementation for development wiring and tests
#[derive(Default)]
pub struct MemoryUserRepository {
    users: std::sync::Mutex<std::collections::HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.lock().expect("user map poisoned");
        if users.values().any(|u| u.is_active && u.email == user.email) {
            return Err(AuthError::EmailTaken);
        }
        if users
            .values()
            .any(|u| u.is_active && u.username == user.username)
        {
            return Err(AuthError::UsernameTaken);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<User>> {
        let users = self.users.lock().expect("user map poisoned");
        Ok(users.get(&user_id).filter(|u| u.is_active).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().expect("user map poisoned");
        Ok(users
            .values()
            .find(|u| u.is_active && u.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().expect("user map poisoned");
        Ok(users
            .values()
            .find(|u| u.is_active && u.username == username)
            .cloned())
    }

    async fn update(&self, user_id: Uuid, update: &UserUpdate) -> AuthResult<User> {
        let mut users = self.users.lock().expect("user map poisoned");
        let user = users
            .get_mut(&user_id)
            .filter(|u| u.is_active)
            .ok_or(AuthError::UserNotFound)?;

        if let Some(first_name) = &update.first_name {
            user.first_name = Some(first_name.clone());
        }
        if let Some(timezone) = &update.timezone {
            user.timezone = timezone.clone();
        }
        if let Some(email_verified) = update.email_verified {
            user.email_verified = email_verified;
        }
        user.updated_at = chrono::Utc::now();
        Ok(user.clone())
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> AuthResult<()> {
        let mut users = self.users.lock().expect("user map poisoned");
        let user = users
            .get_mut(&user_id)
            .filter(|u| u.is_active)
            .ok_or(AuthError::UserNotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn deactivate(&self, user_id: Uuid) -> AuthResult<()> {
        let mut users = self.users.lock().expect("user map poisoned");
        let user = users
            .get_mut(&user_id)
            .filter(|u| u.is_active)
            .ok_or(AuthError::UserNotFound)?;
        user.is_active = false;
        user.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        let users = self.users.lock().expect("user map poisoned");
        Ok(users.values().any(|u| u.is_active && u.email == email))
    }

    async fn username_exists(&self, username: &str) -> AuthResult<bool> {
        let users = self.users.lock().expect("user map poisoned");
        Ok(users.values().any(|u| u.is_active && u.username == username))
    }
}
