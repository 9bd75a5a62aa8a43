//! Authentication API handlers.
//!
//! Registration does not log the user in: the account must verify its
//! email first, so `/register` answers with the created user and no
//! tokens. `/forgot-password` always reports success, whether or not the
//! address exists.

use axum::{
    extract::{Query, Request, State},
    http::{header::USER_AGENT, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use habit_tracker::auth::{TokenPair, User, UserCreate};

use super::middleware::{client_ip, AuthContext};
use super::{api_error, ApiError, AppState};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    /// Email or username
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshPayload {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailParams {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailPayload {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordPayload {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

fn request_meta(request: &Request) -> (Option<String>, Option<String>) {
    let ip = Some(client_ip(request).to_string());
    let ua = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    (ip, ua)
}

/// Create a user and trigger the verification email.
///
/// Returns `201 Created` with the user and no tokens; login is gated on
/// email verification.
pub async fn register(
    State(state): State<AppState>,
    request: Request,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let (ip, ua) = request_meta(&request);
    let payload: RegisterPayload = deserialize_body(request).await?;

    let user = state
        .auth_manager
        .register(
            UserCreate {
                email: payload.email,
                username: payload.username,
                password: payload.password,
                first_name: payload.first_name,
                timezone: payload.timezone,
            },
            ip,
            ua,
        )
        .await
        .map_err(api_error)?;

    metrics::registrations_total();

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user,
            message: "registration successful, please verify your email".to_string(),
        }),
    ))
}

/// Exchange credentials for a token pair
pub async fn login(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<AuthResponse>, ApiError> {
    let (ip, ua) = request_meta(&request);
    let payload: LoginPayload = deserialize_body(request).await?;

    match state
        .auth_manager
        .login(&payload.identifier, &payload.password, ip, ua)
        .await
    {
        Ok((user, pair)) => {
            metrics::login_attempts_total(true);
            Ok(Json(AuthResponse {
                user,
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
                access_expires_at: pair.access_expires_at,
                refresh_expires_at: pair.refresh_expires_at,
            }))
        }
        Err(e) => {
            metrics::login_attempts_total(false);
            Err(api_error(e))
        }
    }
}

/// Revoke the current session
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<StatusCode, ApiError> {
    state
        .auth_manager
        .logout(ctx.user_id, ctx.session_id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rotate the token pair using a refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<TokenResponse>, ApiError> {
    let pair = state
        .auth_manager
        .refresh(&payload.refresh_token)
        .await
        .map_err(api_error)?;
    Ok(Json(TokenResponse::from(pair)))
}

/// Consume a verification token carried in the query string
pub async fn verify_email(
    State(state): State<AppState>,
    Query(params): Query<VerifyEmailParams>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = state
        .auth_manager
        .verify_email(&params.token)
        .await
        .map_err(api_error)?;
    Ok(Json(MessageResponse {
        message: format!("email {} verified", user.email),
    }))
}

/// Re-issue a verification token for an unverified address
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth_manager
        .resend_verification(&payload.email)
        .await
        .map_err(api_error)?;
    Ok(Json(MessageResponse {
        message: "verification email sent".to_string(),
    }))
}

/// Begin a password reset. The response is identical whether or not the
/// address is registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth_manager
        .forgot_password(&payload.email)
        .await
        .map_err(api_error)?;
    Ok(Json(MessageResponse {
        message: "if the address is registered, a reset email has been sent".to_string(),
    }))
}

/// Consume a reset token, rewrite the credential, revoke every session
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth_manager
        .reset_password(&payload.token, &payload.new_password)
        .await
        .map_err(api_error)?;
    Ok(Json(MessageResponse {
        message: "password has been reset, please log in again".to_string(),
    }))
}

/// Read and deserialize a JSON body from a raw request.
///
/// Handlers that also need connection metadata take `Request` whole, so
/// they parse the body themselves instead of using the `Json` extractor.
async fn deserialize_body<T: serde::de::DeserializeOwned>(request: Request) -> Result<T, ApiError> {
    use habit_tracker::rpc::RpcError;

    let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .map_err(|_| api_error(RpcError::invalid_argument("unreadable request body")))?;
    serde_json::from_slice(&body)
        .map_err(|e| api_error(RpcError::invalid_argument(format!("invalid request body: {e}"))))
}
