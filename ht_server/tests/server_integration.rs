//! Integration tests for the HTTP ingress.
//!
//! The full router runs over in-memory repositories, cache, and event
//! bus, so the suite needs no external services. Requests go through
//! `tower::ServiceExt::oneshot` without binding a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use habit_tracker::auth::{AuthManager, TokenConfig, TokenManager};
use habit_tracker::cache::InMemoryCache;
use habit_tracker::db::{
    MemoryConfirmationRepository, MemoryHabitRepository, MemorySessionAuditRepository,
    MemoryUserRepository,
};
use habit_tracker::events::{MemoryEventBus, UserEvent};
use habit_tracker::habits::HabitManager;

use ht_server::api::rate_limiter::IpRateLimiter;
use ht_server::api::{create_router, AppState};

struct TestServer {
    app: axum::Router,
    bus: MemoryEventBus,
}

fn test_server_with_rate_limit(requests_per_minute: u32) -> TestServer {
    let bus = MemoryEventBus::new();

    let auth_manager = Arc::new(AuthManager::new(
        Arc::new(MemoryUserRepository::new()),
        Arc::new(MemorySessionAuditRepository::new()),
        Arc::new(InMemoryCache::new()),
        TokenManager::new(TokenConfig::new(
            "server-test-secret-key-0123456789ab",
            "habit-tracker-test",
        )),
        Arc::new(bus.clone()),
    ));

    let habit_manager = Arc::new(HabitManager::new(
        Arc::new(MemoryHabitRepository::new()),
        Arc::new(MemoryConfirmationRepository::new()),
    ));

    let state = AppState {
        auth_manager,
        habit_manager,
        rate_limiter: Arc::new(IpRateLimiter::new(requests_per_minute)),
    };

    TestServer {
        app: create_router(state),
        bus,
    }
}

fn test_server() -> TestServer {
    test_server_with_rate_limit(10_000)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bearer_request(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn verification_token(bus: &MemoryEventBus) -> String {
    bus.events()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            UserEvent::UserRegistered {
                verification_token, ..
            }
            | UserEvent::EmailVerificationRequested {
                verification_token, ..
            } => Some(verification_token),
            _ => None,
        })
        .expect("verification event")
}

fn reset_token(bus: &MemoryEventBus) -> String {
    bus.events()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            UserEvent::PasswordResetRequested { reset_token, .. } => Some(reset_token),
            _ => None,
        })
        .expect("reset event")
}

/// Register, verify, and log in one user; returns the access token.
async fn signed_in_user(server: &TestServer) -> String {
    let register = json_request(
        Method::POST,
        "/api/v1/auth/register",
        json!({
            "email": "runner@example.com",
            "username": "runner",
            "password": "SecurePass123",
            "timezone": "Europe/Berlin"
        }),
    );
    let response = server.app.clone().oneshot(register).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let token = verification_token(&server.bus);
    let verify = Request::builder()
        .uri(format!("/api/v1/auth/verify-email?token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(verify).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let login = json_request(
        Method::POST,
        "/api/v1/auth/login",
        json!({"identifier": "runner", "password": "SecurePass123"}),
    );
    let response = server.app.clone().oneshot(login).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check_endpoint() {
    let server = test_server();
    let response = server
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn register_verify_login_flow() {
    let server = test_server();

    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/register",
            json!({
                "email": "pat@example.com",
                "username": "pat",
                "password": "SecurePass123",
                "first_name": "Pat",
                "timezone": "America/New_York"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    // No tokens on register, and never a credential hash
    assert!(body.get("access_token").is_none());
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["user"]["email_verified"], json!(false));

    // Login before verification is refused
    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/login",
            json!({"identifier": "pat", "password": "SecurePass123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Verify via the emailed token, then login succeeds
    let token = verification_token(&server.bus);
    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/auth/verify-email?token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/login",
            json!({"identifier": "pat@example.com", "password": "SecurePass123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
}

#[tokio::test]
async fn duplicate_registration_is_conflict() {
    let server = test_server();
    let payload = json!({
        "email": "pat@example.com",
        "username": "pat",
        "password": "SecurePass123",
        "timezone": "UTC"
    });

    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/register",
            payload.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = server
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/auth/register", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn protected_routes_require_a_live_bearer() {
    let server = test_server();

    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/users/profile")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            "/api/v1/users/profile",
            "not-a-real-token",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_kills_the_access_token() {
    let server = test_server();
    let access = signed_in_user(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            "/api/v1/users/profile",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::POST,
            "/api/v1/auth/logout",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The JWT is unchanged but its session is gone
    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            "/api/v1/users/profile",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn habit_lifecycle_over_http() {
    let server = test_server();
    let access = signed_in_user(&server).await;

    // Create a daily habit
    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::POST,
            "/api/v1/habits/create",
            &access,
            Some(json!({
                "name": "Meditate",
                "description": "Ten minutes",
                "schedule": {"type": "interval", "days": 1},
                "timezone_offset_hours": 2
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let habit = body_json(response).await;
    let habit_id = habit["id"].as_str().unwrap().to_string();
    assert_eq!(habit["streak"], json!(0));
    assert_eq!(habit["confirmed_for_current_period"], json!(false));

    // Confirm it
    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::POST,
            &format!("/api/v1/habits/confirm?id={habit_id}"),
            &access,
            Some(json!({"notes": "calm morning"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["habit"]["streak"], json!(1));
    assert_eq!(body["confirmation"]["notes"], json!("calm morning"));

    // A second confirmation the same local day conflicts
    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::POST,
            &format!("/api/v1/habits/confirm?id={habit_id}"),
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // History shows exactly one entry
    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            &format!("/api/v1/habits/history?id={habit_id}"),
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], json!(1));

    // Delete, then the habit is gone
    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::DELETE,
            &format!("/api/v1/habits/delete?id={habit_id}"),
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            &format!("/api/v1/habits/get?id={habit_id}"),
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_habit_is_not_found() {
    let server = test_server();
    let access = signed_in_user(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            &format!("/api/v1/habits/get?id={}", Uuid::now_v7()),
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_habit_payload_is_bad_request() {
    let server = test_server();
    let access = signed_in_user(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::POST,
            "/api/v1/habits/create",
            &access,
            Some(json!({
                "name": "Impossible",
                "schedule": {"type": "weekly", "days": []},
                "timezone_offset_hours": 0
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn password_reset_over_http_revokes_sessions() {
    let server = test_server();
    let access = signed_in_user(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/forgot-password",
            json!({"email": "runner@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Unknown addresses get the same answer
    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/forgot-password",
            json!({"email": "ghost@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let token = reset_token(&server.bus);
    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/reset-password",
            json!({"token": token, "new_password": "RotatedPass77"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The session minted before the reset is dead
    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            "/api/v1/users/profile",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // And the new credential logs in
    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/login",
            json!({"identifier": "runner", "password": "RotatedPass77"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn session_listing_and_targeted_revoke_over_http() {
    let server = test_server();
    let access = signed_in_user(&server).await;

    // A second login from "another device"
    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/login",
            json!({"identifier": "runner", "password": "SecurePass123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            "/api/v1/users/sessions",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);

    // Revoke the one that is not current
    let other = sessions
        .iter()
        .find(|s| s["current"] == json!(false))
        .unwrap();
    let other_id = other["id"].as_str().unwrap();

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::DELETE,
            &format!("/api/v1/users/sessions/{other_id}"),
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            "/api/v1/users/sessions",
            &access,
            None,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rate_limiter_rejects_bursts() {
    let server = test_server_with_rate_limit(3);

    for _ in 0..3 {
        let response = server
            .app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = server
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client IP is unaffected
    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn deactivate_over_http_blocks_further_use() {
    let server = test_server();
    let access = signed_in_user(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::DELETE,
            "/api/v1/users/deactivate",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server
        .app
        .clone()
        .oneshot(bearer_request(
            Method::GET,
            "/api/v1/users/profile",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/auth/login",
            json!({"identifier": "runner", "password": "SecurePass123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
