//! HTTP surface of the delivery service.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use delivery_service::mocks::InMemoryDeliveryRepository;
use delivery_service::server::AppState;
use delivery_service::{DeliveryMachine, DeliverySettings, build_router};
use fulfillment_core::Caller;
use fulfillment_runtime::EventPublisher;
use fulfillment_testing::bearer_token;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let machine = DeliveryMachine::new(
        Arc::new(InMemoryDeliveryRepository::new()),
        EventPublisher::disconnected(),
        DeliverySettings::default(),
    );
    build_router(AppState::new(machine))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str, caller: &Caller) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, bearer_token(caller))
        .body(Body::empty())
        .unwrap()
}

fn patch(uri: &str, caller: &Caller, body: &Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::AUTHORIZATION, bearer_token(caller))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn operator_creates_and_reads_delivery() {
    let app = app();
    let ops = Caller::operator(99, "ops@example.com");

    let (status, _) = send(&app, get("/deliveries/17", &ops)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, patch("/deliveries/17", &ops, &json!({"status": "dispatched"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "DISPATCHED");
    assert_eq!(body["address"], "UNKNOWN");
    assert_eq!(body["courier"], "SpeedX");

    let customer = Caller::customer(1, "ana@example.com");
    let (status, body) = send(&app, get("/deliveries/17", &customer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], 17);
}

#[tokio::test]
async fn bad_updates_are_rejected() {
    let app = app();
    let ops = Caller::operator(99, "ops@example.com");

    let (status, body) = send(&app, patch("/deliveries/1", &ops, &json!({"status": "teleported"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("TELEPORTED"));

    let (status, body) = send(&app, patch("/deliveries/1", &ops, &json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "status is required");

    let customer = Caller::customer(1, "ana@example.com");
    let (status, _) = send(&app, patch("/deliveries/1", &customer, &json!({"status": "DELIVERED"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_reports_degraded_broker() {
    let app = app();
    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["broker"], "degraded");

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (_, body) = send(&app, request).await;
    assert_eq!(body, json!({"ok": true, "service": "delivery"}));
}
