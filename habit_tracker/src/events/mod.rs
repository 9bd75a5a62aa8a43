//! Identity event bus: durable append of identity-domain events for
//! downstream consumers.
//!
//! The session core publishes through the narrow [`EventPublisher`]
//! boundary; records cross the wire as length-delimited serialized frames
//! keyed by user id on the `user-events` topic.

pub mod models;
pub mod publisher;
pub mod wire;

pub use models::{BusRecord, UserEvent};
pub use publisher::{BusConfig, BusPublisher, EventPublisher, MemoryEventBus, PublishError};
