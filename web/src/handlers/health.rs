//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, http::StatusCode};
use serde::Serialize;

/// Liveness body: `{"ok": true, "service": "order"}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Health {
    /// Always `true` while the process answers
    pub ok: bool,
    /// Service name
    pub service: &'static str,
}

/// Simple health check (liveness). Does NOT check dependencies.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[must_use]
pub fn health_check(service: &'static str) -> Json<Health> {
    Json(Health { ok: true, service })
}

/// Readiness report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Readiness {
    /// Whether the service can do its work
    pub ok: bool,
    /// Service name
    pub service: &'static str,
    /// Database answered a ping
    pub database: bool,
    /// `connected` or `degraded`
    pub broker: &'static str,
}

/// Readiness check.
///
/// A missing broker only degrades the service (events are dropped, nothing
/// is consumed), so it is reported but does not fail readiness.
///
/// # Status Codes
///
/// - 200 OK: database reachable
/// - 503 Service Unavailable: database unreachable
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
#[must_use]
pub fn readiness_check(
    service: &'static str,
    database: bool,
    broker_connected: bool,
) -> (StatusCode, Json<Readiness>) {
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(Readiness {
            ok: database,
            service,
            database,
            broker: if broker_connected { "connected" } else { "degraded" },
        }),
    )
}
