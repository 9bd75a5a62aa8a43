//! Bearer authentication and rate-limit middleware.

use std::net::IpAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::{AppState, ErrorResponse};
use crate::metrics;

/// Authenticated caller identity injected into request extensions
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// Validate the bearer access token and inject the caller identity.
///
/// Validation is a round trip to the session core: the JWT must verify
/// and its session must still be live in the cache (which also refreshes
/// the session's activity timestamp). A token whose session was revoked
/// is rejected even though its signature is still valid.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err(unauthorized("missing authorization header"));
    };

    match state.auth_manager.validate_access(token).await {
        Ok((user_id, session_id)) => {
            request.extensions_mut().insert(AuthContext {
                user_id,
                session_id,
            });
            Ok(next.run(request).await)
        }
        Err(e) => Err(unauthorized(&e.client_message())),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Per-IP rate limiting ahead of every route
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&request);

    if !state.rate_limiter.check(ip) {
        metrics::rate_limit_hits_total();
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "rate limit exceeded".to_string(),
            }),
        )
            .into_response());
    }

    Ok(next.run(request).await)
}

/// Client IP: proxy headers first, then the socket address
pub(crate) fn client_ip(request: &Request) -> IpAddr {
    let headers = request.headers();

    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse() {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}
