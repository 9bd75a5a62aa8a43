//! JWT issuance and validation for the access/refresh token pair.
//!
//! Both tokens share one claims shape and differ only in `token_type` and
//! TTL. Validators are type-specific: a refresh token presented to the
//! access validator is rejected and vice versa. The algorithm is pinned to
//! HS256 on both sides so a tampered header cannot downgrade verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};
use super::models::{Claims, TokenType};

/// Token manager configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            issuer: issuer.into(),
        }
    }
}

/// Issues and validates the signed bearer tokens
#[derive(Clone)]
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
}

impl TokenManager {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            issuer: config.issuer,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn generate(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        token_type: TokenType,
        ttl: Duration,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = Claims {
            user_id,
            session_id,
            token_type,
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, expires_at))
    }

    /// Generate a short-lived access token bound to a session
    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        self.generate(user_id, session_id, TokenType::Access, self.access_ttl)
    }

    /// Generate a long-lived refresh token bound to a session
    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        self.generate(user_id, session_id, TokenType::Refresh, self.refresh_ttl)
    }

    fn validate(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        validation.validate_nbf = true;
        if !self.issuer.is_empty() {
            validation.set_issuer(std::slice::from_ref(&self.issuer));
        }

        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Validate a token as an access token
    pub fn validate_access_token(&self, token: &str) -> AuthResult<Claims> {
        let claims = self.validate(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate a token as a refresh token
    pub fn validate_refresh_token(&self, token: &str) -> AuthResult<Claims> {
        let claims = self.validate(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }
}

/// SHA-256 hex digest of a token, the only form a refresh token is ever
/// persisted in.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
