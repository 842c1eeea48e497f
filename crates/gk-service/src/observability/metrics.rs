//! Metrics definitions for Gatekeeper.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gk_` prefix for Gatekeeper
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: 6 values (known routes plus `/other`)
//! - `status`: bounded sets (success, error, timeout)
//! - `outcome`: bounded by `AuthError` variants plus `success`
//!
//! # Alerting
//!
//! `gk_jwks_stale_serves_total` increases only while the identity provider's
//! key endpoint is failing and old keys are being served. A sustained rate
//! should page before the staleness bound turns it into 503s.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gk_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // JWKS fetches are bounded by the 10s client timeout
        .set_buckets_for_metric(
            Matcher::Prefix("gk_jwks_refresh".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gk_http_requests_total`, `gk_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// This captures ALL HTTP responses, including 401/403/503 produced by the
/// auth middleware and framework-level 404/405.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gk_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gk_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto a bounded label value.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/me" => "/api/v1/me",
        "/api/v1/admin/me" => "/api/v1/admin/me",
        _ => "/other",
    }
}

// ============================================================================
// JWKS Key Cache Metrics
// ============================================================================

/// Record a JWKS fetch.
///
/// Metric: `gk_jwks_refresh_total`, `gk_jwks_refresh_duration_seconds`
/// Labels: `status` ("success" or "error")
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("gk_jwks_refresh_duration_seconds").record(duration.as_secs_f64());

    counter!("gk_jwks_refresh_total",
        "status" => status
    )
    .increment(1);
}

/// Record a lookup served from a retained key set after a failed fetch.
///
/// Metric: `gk_jwks_stale_serves_total`
pub fn record_jwks_stale_serve() {
    counter!("gk_jwks_stale_serves_total").increment(1);
}

// ============================================================================
// Authentication / Authorization Metrics
// ============================================================================

/// Record a token validation result.
///
/// Metric: `gk_token_validations_total`
/// Labels: `outcome` ("success" or an `AuthError::kind()` value)
pub fn record_token_validation(outcome: &'static str) {
    counter!("gk_token_validations_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a role check.
///
/// Metric: `gk_role_checks_total`
/// Labels: `outcome` ("granted" or "denied")
pub fn record_role_check(outcome: &'static str) {
    counter!("gk_role_checks_total",
        "outcome" => outcome
    )
    .increment(1);
}

// ============================================================================
// Tests
// ============================================================================
