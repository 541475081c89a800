//! Notification API endpoints.
//!
//! - GET /notifications?type=&scope=&limit= - Notifications in scope, newest first
//! - POST /notifications/:id/read?scope= - Mark one read
//! - GET /notifications/unread-count?scope= - Unread notifications in scope
//!
//! Customers always see their own notifications. Operators see the operator
//! feed unless they pass `scope=user:<id>`.

use crate::domain::{ListQuery, Notification, ScopeQuery, UnreadCount};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use fulfillment_web::{CallerIdentity, WebResult};

/// List notifications.
///
/// # Example
///
/// ```bash
/// curl "http://localhost:3005/notifications?type=delivery&limit=20" \
///   -H "Authorization: Bearer $TOKEN"
/// ```
///
/// # Errors
///
/// 422 for an unknown `type` or `scope`.
pub async fn list_notifications(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Query(query): Query<ListQuery>,
) -> WebResult<Json<Vec<Notification>>> {
    let notifications = state
        .center
        .list(
            &caller,
            query.kind.as_deref(),
            query.scope.as_deref(),
            query.limit,
        )
        .await?;
    Ok(Json(notifications))
}

/// Mark a notification read.
///
/// # Errors
///
/// 404 when the notification is outside the caller's scope.
pub async fn mark_read(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<i64>,
    Query(query): Query<ScopeQuery>,
) -> WebResult<Json<Notification>> {
    Ok(Json(
        state
            .center
            .mark_read(&caller, id, query.scope.as_deref())
            .await?,
    ))
}

/// Count unread notifications.
///
/// # Errors
///
/// 422 for an unknown `scope`.
pub async fn unread_count(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Query(query): Query<ScopeQuery>,
) -> WebResult<Json<UnreadCount>> {
    Ok(Json(
        state
            .center
            .unread_count(&caller, query.scope.as_deref())
            .await?,
    ))
}
