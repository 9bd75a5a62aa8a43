//! HTTP API for the habit-tracking backend.
//!
//! One ingress under `/api/v1` fanning out to the session core and the
//! streak engine. Protected routes go through the bearer middleware,
//! which validates the access token against the session cache (a round
//! trip that also refreshes session activity) before dispatch.
//!
//! # Endpoints Overview
//!
//! ## Authentication (no bearer)
//! - `POST /api/v1/auth/register` - Create user, trigger verification email
//! - `POST /api/v1/auth/login` - Exchange credentials for a token pair
//! - `POST /api/v1/auth/refresh` - Rotate the token pair
//! - `GET  /api/v1/auth/verify-email?token=` - Consume a verification token
//! - `POST /api/v1/auth/resend-verification` - Re-issue a verification token
//! - `POST /api/v1/auth/forgot-password` - Begin reset; always succeeds
//! - `POST /api/v1/auth/reset-password` - Consume reset token, revoke all
//!
//! ## Users (bearer)
//! - `POST   /api/v1/auth/logout` - Revoke the current session
//! - `GET    /api/v1/users/profile` - Current user
//! - `POST   /api/v1/users/change-password` - Verify old, rewrite
//! - `DELETE /api/v1/users/deactivate` - Soft delete
//! - `GET    /api/v1/users/sessions` - List live sessions
//! - `DELETE /api/v1/users/sessions/{session_id}` - Revoke one session
//!
//! ## Habits (bearer)
//! - `POST /api/v1/habits/create`, `GET /list`, `GET /get?id=`,
//!   `POST /update?id=`, `DELETE /delete?id=`, `POST /confirm?id=`,
//!   `GET /history?id=`, `GET /stats?id=`
//!
//! ## Health
//! - `GET /health` - Liveness

pub mod auth;
pub mod habits;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;
pub mod users;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use habit_tracker::rpc::{ErrorCode, RpcError};
use habit_tracker::{AuthManager, HabitManager};

use rate_limiter::IpRateLimiter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    pub habit_manager: Arc<HabitManager>,
    pub rate_limiter: Arc<IpRateLimiter>,
}

/// JSON error body every failing endpoint returns
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// The error shape handlers return
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a wire error code to its HTTP status
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AlreadyExists => StatusCode::CONFLICT,
        ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert any internal error into the HTTP error shape
pub fn api_error(err: impl Into<RpcError>) -> ApiError {
    let err = err.into();
    (
        status_for(err.code),
        Json(ErrorResponse { error: err.message }),
    )
}

/// Create the complete API router with all endpoints and middleware
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh_token))
        .route("/api/v1/auth/verify-email", get(auth::verify_email))
        .route(
            "/api/v1/auth/resend-verification",
            post(auth::resend_verification),
        )
        .route("/api/v1/auth/forgot-password", post(auth::forgot_password))
        .route("/api/v1/auth/reset-password", post(auth::reset_password));

    let protected_routes = Router::new()
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/users/profile", get(users::profile))
        .route("/api/v1/users/change-password", post(users::change_password))
        .route("/api/v1/users/deactivate", delete(users::deactivate))
        .route("/api/v1/users/sessions", get(users::list_sessions))
        .route(
            "/api/v1/users/sessions/{session_id}",
            delete(users::revoke_session),
        )
        .route("/api/v1/habits/create", post(habits::create_habit))
        .route("/api/v1/habits/list", get(habits::list_habits))
        .route("/api/v1/habits/get", get(habits::get_habit))
        .route("/api/v1/habits/update", post(habits::update_habit))
        .route("/api/v1/habits/delete", delete(habits::delete_habit))
        .route("/api/v1/habits/confirm", post(habits::confirm_habit))
        .route("/api/v1/habits/history", get(habits::habit_history))
        .route("/api/v1/habits/stats", get(habits::habit_stats))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers
async fn health_check() -> &'static str {
    "OK"
}
