//! HTTP router and shared state.

use crate::api;
use crate::fanout::NotificationCenter;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use fulfillment_web::handlers::health::{Health, Readiness};
use fulfillment_web::handlers::{health_check, readiness_check};
use fulfillment_web::with_observability;

/// Service name reported by the health endpoints.
pub const SERVICE_NAME: &str = "notification";

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Notification operations
    pub center: NotificationCenter,
    /// Whether the consumer has a broker to read from
    pub broker_connected: bool,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub const fn new(center: NotificationCenter, broker_connected: bool) -> Self {
        Self {
            center,
            broker_connected,
        }
    }
}

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/notifications", get(api::list_notifications))
        .route("/notifications/unread-count", get(api::unread_count))
        .route("/notifications/:id/read", post(api::mark_read))
        .with_state(state);

    with_observability(router)
}

async fn health() -> Json<Health> {
    health_check(SERVICE_NAME)
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    readiness_check(
        SERVICE_NAME,
        state.center.ready().await,
        state.broker_connected,
    )
}
