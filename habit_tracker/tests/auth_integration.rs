//! Integration tests for the session core.
//!
//! Runs against the in-memory user repository, session audit mirror,
//! cache, and event bus; the flows mirror what the ingress drives.

use std::sync::Arc;

use uuid::Uuid;

use habit_tracker::auth::{
    AuthError, AuthManager, TokenConfig, TokenManager, UserCreate, UserUpdate,
};
use habit_tracker::cache::InMemoryCache;
use habit_tracker::db::{MemorySessionAuditRepository, MemoryUserRepository};
use habit_tracker::events::{MemoryEventBus, UserEvent};

struct Harness {
    auth: AuthManager,
    bus: MemoryEventBus,
}

fn harness() -> Harness {
    let bus = MemoryEventBus::new();
    let auth = AuthManager::new(
        Arc::new(MemoryUserRepository::new()),
        Arc::new(MemorySessionAuditRepository::new()),
        Arc::new(InMemoryCache::new()),
        TokenManager::new(TokenConfig::new(
            "integration-test-secret",
            "habit-tracker-test",
        )),
        Arc::new(bus.clone()),
    );
    Harness { auth, bus }
}

fn create(email: &str, username: &str) -> UserCreate {
    UserCreate {
        email: email.to_string(),
        username: username.to_string(),
        password: "CorrectHorse9".to_string(),
        first_name: Some("Pat".to_string()),
        timezone: "America/New_York".to_string(),
    }
}

fn latest_verification_token(bus: &MemoryEventBus, user: Uuid) -> String {
    bus.events()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            UserEvent::UserRegistered {
                user_id,
                verification_token,
                ..
            }
            | UserEvent::EmailVerificationRequested {
                user_id,
                verification_token,
                ..
            } if user_id == user => Some(verification_token),
            _ => None,
        })
        .expect("verification event")
}

fn latest_reset_token(bus: &MemoryEventBus, user: Uuid) -> String {
    bus.events()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            UserEvent::PasswordResetRequested {
                user_id,
                reset_token,
                ..
            } if user_id == user => Some(reset_token),
            _ => None,
        })
        .expect("reset event")
}

#[tokio::test]
async fn verification_gated_login_end_to_end() {
    let h = harness();

    let user = h
        .auth
        .register(create("pat@example.com", "pat"), None, None)
        .await
        .unwrap();

    // Immediate login fails: email not verified
    assert!(matches!(
        h.auth
            .login("pat@example.com", "CorrectHorse9", None, None)
            .await,
        Err(AuthError::EmailNotVerified)
    ));

    // The registration event carries the token out of band
    let token = latest_verification_token(&h.bus, user.id);
    let verified = h.auth.verify_email(&token).await.unwrap();
    assert!(verified.email_verified);

    // Second login succeeds
    let (_, pair) = h
        .auth
        .login("pat@example.com", "CorrectHorse9", None, None)
        .await
        .unwrap();
    let (user_id, _) = h.auth.validate_access(&pair.access_token).await.unwrap();
    assert_eq!(user_id, user.id);
}

#[tokio::test]
async fn resend_issues_a_fresh_usable_token() {
    let h = harness();
    let user = h
        .auth
        .register(create("pat@example.com", "pat"), None, None)
        .await
        .unwrap();

    h.auth.resend_verification("pat@example.com").await.unwrap();
    assert_eq!(
        h.bus.event_types(),
        vec!["user_registered", "email_verification_requested"]
    );

    let token = latest_verification_token(&h.bus, user.id);
    assert!(h.auth.verify_email(&token).await.is_ok());
}

#[tokio::test]
async fn reset_revokes_all_sessions_end_to_end() {
    let h = harness();
    let user = h
        .auth
        .register(create("pat@example.com", "pat"), None, None)
        .await
        .unwrap();
    let token = latest_verification_token(&h.bus, user.id);
    h.auth.verify_email(&token).await.unwrap();

    // Two independent logins -> two live sessions
    let (_, s1) = h
        .auth
        .login("pat@example.com", "CorrectHorse9", None, None)
        .await
        .unwrap();
    let (_, s2) = h
        .auth
        .login("pat", "CorrectHorse9", None, None)
        .await
        .unwrap();
    assert_eq!(h.auth.get_user_sessions(user.id).await.unwrap().len(), 2);

    h.auth.forgot_password("pat@example.com").await.unwrap();
    let reset = latest_reset_token(&h.bus, user.id);
    h.auth.reset_password(&reset, "FreshStart22").await.unwrap();

    // Every pre-existing token is now dead, though still well signed
    assert!(h.auth.validate_access(&s1.access_token).await.is_err());
    assert!(h.auth.validate_access(&s2.access_token).await.is_err());
    assert!(h.auth.refresh(&s1.refresh_token).await.is_err());
    assert!(h.auth.get_user_sessions(user.id).await.unwrap().is_empty());

    // The change event reports it came from a reset
    assert!(h.bus.events().iter().any(|e| matches!(
        e,
        UserEvent::PasswordChanged {
            was_reset: true,
            ..
        }
    )));
}

#[tokio::test]
async fn refresh_keeps_session_identity_but_rotates_credentials() {
    let h = harness();
    let user = h
        .auth
        .register(create("pat@example.com", "pat"), None, None)
        .await
        .unwrap();
    let token = latest_verification_token(&h.bus, user.id);
    h.auth.verify_email(&token).await.unwrap();

    let (_, original) = h
        .auth
        .login("pat", "CorrectHorse9", None, None)
        .await
        .unwrap();
    let (_, original_session) = h.auth.validate_access(&original.access_token).await.unwrap();

    let rotated = h.auth.refresh(&original.refresh_token).await.unwrap();
    let (_, rotated_session) = h.auth.validate_access(&rotated.access_token).await.unwrap();

    assert_eq!(original_session, rotated_session);
    assert_ne!(original.refresh_token, rotated.refresh_token);

    // Only one session exists for the user after rotation
    assert_eq!(h.auth.get_user_sessions(user.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn profile_updates_touch_only_mutable_fields() {
    let h = harness();
    let user = h
        .auth
        .register(create("pat@example.com", "pat"), None, None)
        .await
        .unwrap();

    let updated = h
        .auth
        .update_profile(
            user.id,
            UserUpdate {
                first_name: Some("Patricia".to_string()),
                timezone: Some("Europe/Madrid".to_string()),
                email_verified: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.first_name.as_deref(), Some("Patricia"));
    assert_eq!(updated.timezone, "Europe/Madrid");
    assert_eq!(updated.email, "pat@example.com");
    assert!(!updated.email_verified);
}

#[tokio::test]
async fn forgot_password_response_is_indistinguishable() {
    let h = harness();
    h.auth
        .register(create("pat@example.com", "pat"), None, None)
        .await
        .unwrap();

    let known = h.auth.forgot_password("pat@example.com").await;
    let unknown = h.auth.forgot_password("missing@example.com").await;

    assert!(known.is_ok());
    assert!(unknown.is_ok());
}
