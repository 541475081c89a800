//! Delivery API endpoints.
//!
//! - GET /deliveries/:order_id - The order's delivery
//! - PATCH /deliveries/:order_id - Set its status (operators only)

use crate::domain::{Delivery, StatusUpdate};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use fulfillment_web::{CallerIdentity, WebResult};

/// The order's delivery.
///
/// # Errors
///
/// 404 when no delivery exists yet.
pub async fn get_delivery(
    State(state): State<AppState>,
    CallerIdentity(_caller): CallerIdentity,
    Path(order_id): Path<i64>,
) -> WebResult<Json<Delivery>> {
    Ok(Json(state.machine.latest(order_id).await?))
}

/// Set a delivery's status.
///
/// # Example
///
/// ```bash
/// curl -X PATCH http://localhost:3004/deliveries/17 \
///   -H "Authorization: Bearer $ADMIN_TOKEN" \
///   -H "Content-Type: application/json" \
///   -d '{"status":"dispatched"}'
/// ```
///
/// # Errors
///
/// 403 for customers, 422 for an unknown status.
pub async fn update_delivery(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(order_id): Path<i64>,
    Json(update): Json<StatusUpdate>,
) -> WebResult<Json<Delivery>> {
    let delivery = state
        .machine
        .set_status(&caller, order_id, &update.status)
        .await?;
    Ok(Json(delivery))
}
