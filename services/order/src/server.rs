//! HTTP router and shared state.

use crate::api;
use crate::engine::OrderEngine;
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
pub const SERVICE_NAME: &str = "order";

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Order operations
    pub engine: OrderEngine,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub const fn new(engine: OrderEngine) -> Self {
        Self { engine }
    }
}

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/orders", post(api::place_order).get(api::list_orders))
        .route("/orders/all", get(api::list_all_orders))
        .route("/orders/:id", get(api::get_order))
        .with_state(state);

    with_observability(router)
}

async fn health() -> Json<Health> {
    health_check(SERVICE_NAME)
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    readiness_check(
        SERVICE_NAME,
        state.engine.ready().await,
        state.engine.broker_connected(),
    )
}
