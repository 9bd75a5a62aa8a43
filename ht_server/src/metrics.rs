//! Prometheus metrics for monitoring the habit-tracker backend.
//!
//! Metrics are exposed in Prometheus text format on a dedicated listener
//! for scraping.

#![allow(dead_code)] // Public API for dashboards still being wired up

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize the Prometheus metrics exporter.
///
/// Metrics become available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record an HTTP request with method, path, and status labels
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Increment login attempts counter
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment registrations counter
pub fn registrations_total() {
    metrics::counter!("registrations_total").increment(1);
}

/// Increment sessions revoked counter
pub fn sessions_revoked_total(count: u64) {
    metrics::counter!("sessions_revoked_total").increment(count);
}

// ============================================================================
// Habit Metrics
// ============================================================================

/// Increment habit confirmations counter
pub fn habit_confirmations_total() {
    metrics::counter!("habit_confirmations_total").increment(1);
}

/// Increment streak resets counter (missed deadlines)
pub fn streak_resets_total(count: u64) {
    metrics::counter!("streak_resets_total").increment(count);
}

// ============================================================================
// Sweeper Metrics
// ============================================================================

/// Increment sweeper ticks counter
pub fn sweeper_ticks_total() {
    metrics::counter!("sweeper_ticks_total").increment(1);
}

/// Record sweeper tick duration in milliseconds
pub fn sweeper_tick_duration_ms(duration_ms: f64) {
    metrics::histogram!("sweeper_tick_duration_ms").record(duration_ms);
}

// ============================================================================
// Rate Limiting Metrics
// ============================================================================

/// Increment rate limit hits counter
pub fn rate_limit_hits_total() {
    metrics::counter!("rate_limit_hits_total").increment(1);
}
