//! HTTP ingress library for the habit-tracking backend.
//!
//! The binary in `main.rs` wires configuration, stores, and managers into
//! [`api::create_router`]; integration tests build the same router over
//! in-memory backends.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
