//! Identity event payloads published for downstream consumers (email).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An identity-domain event with its envelope fields.
///
/// The enum variant is the `event_type` discriminator on the wire;
/// records are partitioned by `user_id()` so one user's events stay
/// ordered for the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UserEvent {
    UserRegistered {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        user_id: Uuid,
        email: String,
        username: String,
        first_name: String,
        verification_token: String,
        timezone: String,
        created_at: DateTime<Utc>,
    },
    EmailVerificationRequested {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        user_id: Uuid,
        email: String,
        verification_token: String,
    },
    PasswordResetRequested {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        user_id: Uuid,
        email: String,
        reset_token: String,
        requested_at: DateTime<Utc>,
    },
    PasswordChanged {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        user_id: Uuid,
        email: String,
        changed_at: DateTime<Utc>,
        was_reset: bool,
    },
}

impl UserEvent {
    /// Partition key: the owning user's id
    pub fn user_id(&self) -> Uuid {
        match self {
            UserEvent::UserRegistered { user_id, .. }
            | UserEvent::EmailVerificationRequested { user_id, .. }
            | UserEvent::PasswordResetRequested { user_id, .. }
            | UserEvent::PasswordChanged { user_id, .. } => *user_id,
        }
    }

    /// Event discriminator name, as carried on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered { .. } => "user_registered",
            UserEvent::EmailVerificationRequested { .. } => "email_verification_requested",
            UserEvent::PasswordResetRequested { .. } => "password_reset_requested",
            UserEvent::PasswordChanged { .. } => "password_changed",
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            UserEvent::UserRegistered { event_id, .. }
            | UserEvent::EmailVerificationRequested { event_id, .. }
            | UserEvent::PasswordResetRequested { event_id, .. }
            | UserEvent::PasswordChanged { event_id, .. } => *event_id,
        }
    }
}

/// A keyed record as written to the bus: topic, partition key, payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRecord {
    pub topic: String,
    pub key: Uuid,
    pub event: UserEvent,
}
