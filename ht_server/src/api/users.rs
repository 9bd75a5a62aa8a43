//! User profile and session management handlers.

use axum::{extract::Path, extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use habit_tracker::auth::{Session, User};

use super::middleware::AuthContext;
use super::{api_error, ApiError, AppState};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct ChangePasswordPayload {
    pub old_password: String,
    pub new_password: String,
}

/// Session view without the credential hash
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
}

fn session_view(session: &Session, current_session: Uuid) -> SessionResponse {
    SessionResponse {
        id: session.id,
        ip_address: session.ip_address.clone(),
        user_agent: session.user_agent.clone(),
        created_at: session.created_at,
        last_activity_at: session.last_activity_at,
        expires_at: session.expires_at,
        current: session.id == current_session,
    }
}

/// Return the current user
pub async fn profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .auth_manager
        .get_profile(ctx.user_id)
        .await
        .map_err(api_error)?;
    Ok(Json(user))
}

/// Verify the old credential and rewrite the hash. Existing sessions
/// survive; only the reset flow revokes globally.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<ChangePasswordPayload>,
) -> Result<StatusCode, ApiError> {
    state
        .auth_manager
        .change_password(ctx.user_id, &payload.old_password, &payload.new_password)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Soft-delete the account and revoke every live session
pub async fn deactivate(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<StatusCode, ApiError> {
    state
        .auth_manager
        .deactivate(ctx.user_id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the caller's live sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state
        .auth_manager
        .get_user_sessions(ctx.user_id)
        .await
        .map_err(api_error)?;

    Ok(Json(SessionListResponse {
        sessions: sessions
            .iter()
            .map(|s| session_view(s, ctx.session_id))
            .collect(),
    }))
}

/// Revoke one of the caller's sessions
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .auth_manager
        .revoke_session(ctx.user_id, session_id)
        .await
        .map_err(api_error)?;
    metrics::sessions_revoked_total(1);
    Ok(StatusCode::NO_CONTENT)
}
