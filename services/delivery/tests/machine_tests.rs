//! Delivery state machine against the in-memory repository and bus.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use delivery_service::mocks::InMemoryDeliveryRepository;
use delivery_service::{
    Created, DeliveryMachine, DeliveryRepository, DeliverySettings, OrderCreatedHandler,
    TransitionPolicy,
};
use fulfillment_core::{
    Caller, DeliveryStatus, DeliveryUpdated, EventBus, FulfillmentEvent, OrderCreated,
    OrderDetails, ServiceError, Topology,
};
use fulfillment_runtime::{EventConsumer, EventPublisher, RetryPolicy};
use fulfillment_testing::{InMemoryEventBus, RecordingDeadLetters};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn order_created(order_id: i64) -> OrderCreated {
    OrderCreated {
        order_id,
        user_id: 1,
        address: "12 Main St".to_string(),
        total: Decimal::new(10000, 2),
        customer_email: "ana@example.com".to_string(),
        customer_name: "ana".to_string(),
        order_details: OrderDetails {
            order_id,
            items: Vec::new(),
            total: Decimal::new(10000, 2),
            delivery_address: "12 Main St".to_string(),
        },
    }
}

fn machine(settings: DeliverySettings) -> (DeliveryMachine, InMemoryDeliveryRepository, Arc<InMemoryEventBus>) {
    let repository = InMemoryDeliveryRepository::new();
    let bus = Arc::new(InMemoryEventBus::new("events"));
    let machine = DeliveryMachine::new(
        Arc::new(repository.clone()),
        EventPublisher::connected(bus.clone()),
        settings,
    );
    (machine, repository, bus)
}

fn updates(bus: &InMemoryEventBus) -> Vec<DeliveryUpdated> {
    bus.published_events()
        .into_iter()
        .filter_map(|event| match event {
            FulfillmentEvent::DeliveryUpdated(update) => Some(update),
            FulfillmentEvent::OrderCreated(_) => None,
        })
        .collect()
}

fn operator() -> Caller {
    Caller::operator(99, "ops@example.com")
}

#[tokio::test]
async fn order_created_opens_pending_delivery_once() {
    let (machine, repository, bus) = machine(DeliverySettings::default());

    let first = machine.on_order_created(&order_created(17)).await.unwrap();
    let Created::New(delivery) = first else {
        unreachable!("first order.created must create a row");
    };
    assert_eq!(delivery.status, DeliveryStatus::Pending);
    assert_eq!(delivery.courier, "SpeedX");
    assert_eq!(delivery.address, "12 Main St");

    let again = machine.on_order_created(&order_created(17)).await.unwrap();
    assert!(matches!(again, Created::Existing(_)));

    assert_eq!(repository.count(), 1);
    let pending = DeliveryUpdated {
        order_id: 17,
        status: DeliveryStatus::Pending,
    };
    assert_eq!(updates(&bus), vec![pending.clone(), pending]);
}

#[tokio::test]
async fn redelivered_order_created_reannounces_existing_row() {
    let (machine, repository, bus) = machine(DeliverySettings::default());
    repository
        .create_pending(5, "12 Main St", "SpeedX")
        .await
        .unwrap();
    assert!(bus.published_events().is_empty());

    let created = machine.on_order_created(&order_created(5)).await.unwrap();
    assert!(matches!(created, Created::Existing(_)));

    assert_eq!(repository.count(), 1);
    assert_eq!(
        updates(&bus),
        vec![DeliveryUpdated {
            order_id: 5,
            status: DeliveryStatus::Pending
        }]
    );
}

#[tokio::test]
async fn operator_update_before_order_created_is_backfilled() {
    let (machine, repository, bus) = machine(DeliverySettings::default());

    let early = machine.set_status(&operator(), 5, "dispatched").await.unwrap();
    assert_eq!(early.status, DeliveryStatus::Dispatched);
    assert_eq!(early.address, "UNKNOWN");

    let created = machine.on_order_created(&order_created(5)).await.unwrap();
    let delivery = created.delivery();
    assert!(matches!(created, Created::Existing(_)));
    assert_eq!(delivery.address, "12 Main St");
    assert_eq!(delivery.status, DeliveryStatus::Dispatched);

    assert_eq!(repository.count(), 1);
    let statuses: Vec<DeliveryStatus> = updates(&bus).into_iter().map(|u| u.status).collect();
    assert_eq!(statuses, vec![DeliveryStatus::Dispatched, DeliveryStatus::Dispatched]);
}

#[tokio::test]
async fn set_status_publishes_every_change() {
    let (machine, _, bus) = machine(DeliverySettings::default());
    machine.on_order_created(&order_created(3)).await.unwrap();

    machine.set_status(&operator(), 3, " in_transit ").await.unwrap();
    machine.set_status(&operator(), 3, "DELIVERED").await.unwrap();

    let statuses: Vec<DeliveryStatus> = updates(&bus).into_iter().map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            DeliveryStatus::Pending,
            DeliveryStatus::InTransit,
            DeliveryStatus::Delivered
        ]
    );
    assert_eq!(machine.latest(3).await.unwrap().status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn invalid_status_changes_nothing() {
    let (machine, repository, bus) = machine(DeliverySettings::default());

    let err = machine.set_status(&operator(), 3, "lost").await.unwrap_err();
    let ServiceError::Validation(message) = err else {
        unreachable!("expected a validation error");
    };
    assert!(message.contains("LOST"));
    assert!(message.contains("DISPATCHED"));

    assert_eq!(repository.count(), 0);
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn customers_cannot_change_status() {
    let (machine, repository, _) = machine(DeliverySettings::default());
    let err = machine
        .set_status(&Caller::customer(1, "ana@example.com"), 3, "DELIVERED")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
    assert_eq!(repository.count(), 0);
}

#[tokio::test]
async fn forward_only_policy_rejects_regressions() {
    let settings = DeliverySettings {
        transitions: TransitionPolicy::ForwardOnly,
        ..DeliverySettings::default()
    };
    let (machine, _, bus) = machine(settings);
    machine.on_order_created(&order_created(8)).await.unwrap();
    machine.set_status(&operator(), 8, "DISPATCHED").await.unwrap();

    let err = machine.set_status(&operator(), 8, "PENDING").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(machine.latest(8).await.unwrap().status, DeliveryStatus::Dispatched);
    assert_eq!(updates(&bus).len(), 2);
}

#[tokio::test]
async fn latest_without_delivery_is_not_found() {
    let (machine, _, _) = machine(DeliverySettings::default());
    assert_eq!(
        machine.latest(404).await.unwrap_err(),
        ServiceError::not_found("delivery", 404)
    );
}

#[tokio::test]
async fn consumer_creates_delivery_and_retries_storage_outage() {
    let (machine, repository, bus) = machine(DeliverySettings::default());
    let topology = Topology::new("events", "delivery-service").bind("order.created");
    bus.declare_topology(&topology).await.unwrap();

    let dead_letters = RecordingDeadLetters::new();
    let (shutdown, rx) = broadcast::channel(1);
    let task = EventConsumer::new(
        topology,
        bus.clone(),
        Arc::new(OrderCreatedHandler::new(machine)),
        Arc::new(dead_letters.clone()),
        rx,
    )
    .with_retry_policy(
        RetryPolicy::builder()
            .max_retries(50)
            .initial_delay(Duration::from_millis(2))
            .max_delay(Duration::from_millis(5))
            .build(),
    )
    .spawn();

    repository.set_offline(true);
    let payload = FulfillmentEvent::from(order_created(21)).to_json().unwrap();
    bus.publish("order.created", &payload).await.unwrap();
    bus.publish("order.created", &payload).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(repository.count(), 0);
    repository.set_offline(false);

    assert!(bus.wait_until_drained("delivery-service", Duration::from_secs(2)).await);
    assert_eq!(repository.count(), 1);
    assert_eq!(bus.acked("delivery-service"), 2);
    assert_eq!(updates(&bus).len(), 2);
    assert!(dead_letters.letters().is_empty());

    shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
