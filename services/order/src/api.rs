//! Order API endpoints.
//!
//! - POST /orders - Place an order for the caller
//! - GET /orders - The caller's orders with their items
//! - GET /orders/all - Every order (operators only)
//! - GET /orders/:id - One of the caller's orders

use crate::domain::{Order, OrderDetail, OrderWithItems, PlaceOrderRequest};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use fulfillment_web::{CallerIdentity, CorrelationId, WebResult};

/// Place an order.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:3003/orders \
///   -H "Authorization: Bearer $TOKEN" \
///   -H "Content-Type: application/json" \
///   -d '{"items":[{"medicineId":7,"quantity":2}],"address":"12 Main St"}'
/// ```
///
/// # Errors
///
/// 422 for malformed input, 409 for unknown medicines or short stock.
pub async fn place_order(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    correlation_id: CorrelationId,
    Json(request): Json<PlaceOrderRequest>,
) -> WebResult<(StatusCode, Json<OrderDetail>)> {
    tracing::debug!(
        correlation_id = %correlation_id.0,
        user_id = caller.user_id,
        lines = request.items.len(),
        "Placing order"
    );

    let detail = state.engine.place(&caller, &request).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// The caller's orders, newest first.
///
/// # Errors
///
/// 500 when storage fails.
pub async fn list_orders(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> WebResult<Json<Vec<OrderWithItems>>> {
    Ok(Json(state.engine.list_mine(&caller).await?))
}

/// Every order, newest first.
///
/// # Errors
///
/// 403 for customers.
pub async fn list_all_orders(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> WebResult<Json<Vec<Order>>> {
    Ok(Json(state.engine.list_all(&caller).await?))
}

/// One order with its items.
///
/// # Errors
///
/// 404 when the order is absent or owned by someone else.
pub async fn get_order(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(order_id): Path<i64>,
) -> WebResult<Json<OrderDetail>> {
    Ok(Json(state.engine.get(&caller, order_id).await?))
}
