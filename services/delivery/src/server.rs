//! HTTP router and shared state.

use crate::api;
use crate::machine::DeliveryMachine;
use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use fulfillment_web::handlers::health::{Health, Readiness};
use fulfillment_web::handlers::{health_check, readiness_check};
use fulfillment_web::with_observability;

/// Service name reported by the health endpoints.
pub const SERVICE_NAME: &str = "delivery";

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Delivery operations
    pub machine: DeliveryMachine,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub const fn new(machine: DeliveryMachine) -> Self {
        Self { machine }
    }
}

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route(
            "/deliveries/:order_id",
            get(api::get_delivery).patch(api::update_delivery),
        )
        .with_state(state);

    with_observability(router)
}

async fn health() -> Json<Health> {
    health_check(SERVICE_NAME)
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    readiness_check(
        SERVICE_NAME,
        state.machine.ready().await,
        state.machine.broker_connected(),
    )
}
