//! Metrics definitions for bearer authentication
//!
//! All metrics follow Prometheus naming conventions:
//! - `broker_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: 2 values (success, error)
//! - `error_category`: 4 values (verification, policy, expiration, none)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record one authentication attempt and its outcome
///
/// Metric: `broker_auth_attempts_total`, `broker_auth_duration_seconds`
/// Labels: `status`, `error_category`
pub fn record_authentication(status: &str, error_category: Option<&str>, duration: Duration) {
    let category = error_category.unwrap_or("none");

    histogram!("broker_auth_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("broker_auth_attempts_total", "status" => status.to_string(), "error_category" => category.to_string())
        .increment(1);
}

/// Record a connection closed because its session expired
///
/// Metric: `broker_auth_sessions_expired_total`
pub fn record_session_expired() {
    counter!("broker_auth_sessions_expired_total").increment(1);
}

// ============================================================================
// Key Metrics
// ============================================================================

/// Update the loaded verification key count
///
/// Metric: `broker_auth_verification_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_verification_keys(count: usize) {
    gauge!("broker_auth_verification_keys").set(count as f64);
}
