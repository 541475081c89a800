//! HTTP surface of the notification service.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use fulfillment_core::{Caller, DeliveryStatus, DeliveryUpdated};
use fulfillment_testing::bearer_token;
use notification_service::mocks::{InMemoryNotificationRepository, RecordingMailer};
use notification_service::server::AppState;
use notification_service::{NotificationCenter, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let repository = InMemoryNotificationRepository::new();
    repository.add_order(17, 4);
    let center = NotificationCenter::new(Arc::new(repository), Arc::new(RecordingMailer::new()));
    center
        .on_delivery_updated(&DeliveryUpdated {
            order_id: 17,
            status: DeliveryStatus::Delivered,
        })
        .await
        .unwrap();
    build_router(AppState::new(center, false))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn request(method: &str, uri: &str, caller: &Caller) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer_token(caller))
        .body(Body::empty())
        .unwrap()
}

fn customer() -> Caller {
    Caller::customer(4, "ana@example.com")
}

#[tokio::test]
async fn customer_reads_and_marks_own_notifications() {
    let app = app().await;

    let (status, body) = send(&app, request("GET", "/notifications", &customer())).await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["type"], "delivery");
    assert!(list[0].get("kind").is_none());
    assert_eq!(list[0]["message"], "Order #17 has been delivered");
    let id = list[0]["id"].as_i64().unwrap();

    let (_, body) = send(&app, request("GET", "/notifications/unread-count", &customer())).await;
    assert_eq!(body, json!({"count": 1}));

    let uri = format!("/notifications/{id}/read");
    let (status, body) = send(&app, request("POST", &uri, &customer())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_read"], true);

    let (_, body) = send(&app, request("GET", "/notifications/unread-count", &customer())).await;
    assert_eq!(body, json!({"count": 0}));
}

#[tokio::test]
async fn scoping_is_enforced() {
    let app = app().await;
    let ops = Caller::operator(99, "ops@example.com");

    let (_, body) = send(&app, request("GET", "/notifications", &ops)).await;
    assert_eq!(body, json!([]));

    let (_, body) = send(&app, request("GET", "/notifications?scope=user:4&type=delivery", &ops)).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let stranger = Caller::customer(5, "bo@example.com");
    let (_, body) = send(&app, request("GET", "/notifications?scope=user:4", &stranger)).await;
    assert_eq!(body, json!([]));

    let (status, _) = send(&app, request("POST", "/notifications/1/read", &stranger)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_queries_are_rejected() {
    let app = app().await;
    let ops = Caller::operator(99, "ops@example.com");

    let (status, body) = send(&app, request("GET", "/notifications?type=sms", &customer())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app, request("GET", "/notifications/unread-count?scope=all", &ops)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let app = app().await;
    let request = Request::builder()
        .uri("/notifications")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn readiness_reports_missing_broker() {
    let app = app().await;
    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["broker"], "degraded");

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (_, body) = send(&app, request).await;
    assert_eq!(body, json!({"ok": true, "service": "notification"}));
}
