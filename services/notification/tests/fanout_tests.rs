//! Notification fan-out against the in-memory repository, mailer and bus.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use delivery_service::mocks::InMemoryDeliveryRepository;
use delivery_service::{DeliveryMachine, DeliveryRepository, DeliverySettings, OrderCreatedHandler};
use fulfillment_core::{
    Caller, DeliveryStatus, DeliveryUpdated, EventBus, FulfillmentEvent, LineItemSummary,
    OrderCreated, OrderDetails, ServiceError, Topology,
};
use fulfillment_runtime::{EventConsumer, EventPublisher, RetryPolicy};
use fulfillment_testing::{InMemoryEventBus, RecordingDeadLetters, test_clock};
use notification_service::mocks::{InMemoryNotificationRepository, RecordingMailer};
use notification_service::{FanoutHandler, NotificationCenter, NotificationScope};
use order_service::OrderEngine;
use order_service::domain::PlaceOrderRequest;
use order_service::mocks::InMemoryOrderRepository;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

fn order_created(order_id: i64, user_id: i64) -> OrderCreated {
    OrderCreated {
        order_id,
        user_id,
        address: "12 Main St".to_string(),
        total: Decimal::new(10000, 2),
        customer_email: "ana@example.com".to_string(),
        customer_name: "ana".to_string(),
        order_details: OrderDetails {
            order_id,
            items: vec![LineItemSummary {
                name: "Paracetamol".to_string(),
                quantity: 2,
                price: Decimal::new(5000, 2),
            }],
            total: Decimal::new(10000, 2),
            delivery_address: "12 Main St".to_string(),
        },
    }
}

fn center() -> (NotificationCenter, InMemoryNotificationRepository, RecordingMailer) {
    let repository = InMemoryNotificationRepository::with_clock(Arc::new(test_clock()));
    let mailer = RecordingMailer::new();
    let center = NotificationCenter::new(Arc::new(repository.clone()), Arc::new(mailer.clone()));
    (center, repository, mailer)
}

fn operator() -> Caller {
    Caller::operator(99, "ops@example.com")
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(50)
        .initial_delay(Duration::from_millis(2))
        .max_delay(Duration::from_millis(5))
        .build()
}

#[tokio::test]
async fn order_created_notifies_operators_and_customer_then_emails() {
    let (center, repository, mailer) = center();

    let stored = center.on_order_created(&order_created(17, 4)).await.unwrap();
    assert_eq!(stored.len(), 2);

    let ops = center.list(&operator(), None, None, None).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].title, "New order #17");
    assert_eq!(ops[0].user_id, None);

    let mine = center
        .list(&Caller::customer(4, "ana@example.com"), None, None, None)
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].title, "Order #17 placed");
    assert_eq!(mine[0].kind, "order");

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ana@example.com");
    assert!(sent[0].body.contains("2 x Paracetamol"));
    assert_eq!(repository.all().len(), 2);
}

#[tokio::test]
async fn email_failure_does_not_undo_notifications() {
    let (center, repository, mailer) = center();
    mailer.set_fail(true);

    let stored = center.on_order_created(&order_created(5, 4)).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(repository.all().len(), 2);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn delivery_update_notifies_owner_once() {
    let (center, repository, _) = center();
    repository.add_order(17, 4);

    let update = DeliveryUpdated {
        order_id: 17,
        status: DeliveryStatus::Dispatched,
    };
    let stored = center.on_delivery_updated(&update).await.unwrap().unwrap();
    assert_eq!(stored.kind, "delivery");
    assert_eq!(stored.user_id, Some(4));
    assert_eq!(stored.message, "Order #17 has been dispatched");

    assert_eq!(repository.all().len(), 1);
    assert!(center.list(&operator(), None, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn delivery_update_for_unknown_order_is_skipped() {
    let (center, repository, _) = center();
    let update = DeliveryUpdated {
        order_id: 404,
        status: DeliveryStatus::Delivered,
    };
    assert_eq!(center.on_delivery_updated(&update).await.unwrap(), None);
    assert!(repository.all().is_empty());
}

#[tokio::test]
async fn listing_is_scoped_filtered_newest_first_and_limited() {
    let (center, repository, _) = center();
    repository.add_order(1, 4);
    for order_id in 1..=3 {
        center.on_order_created(&order_created(order_id, 4)).await.unwrap();
    }
    center
        .on_delivery_updated(&DeliveryUpdated {
            order_id: 1,
            status: DeliveryStatus::InTransit,
        })
        .await
        .unwrap();

    let customer = Caller::customer(4, "ana@example.com");
    let all = center.list(&customer, None, None, None).await.unwrap();
    let ids: Vec<i64> = all.iter().map(|n| n.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(ids, sorted);
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|n| n.user_id == Some(4)));

    let deliveries = center
        .list(&customer, Some("delivery"), None, None)
        .await
        .unwrap();
    assert_eq!(deliveries.len(), 1);

    let page = center.list(&customer, None, None, Some(2)).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, ids[0]);

    let zero = center.list(&customer, None, None, Some(0)).await.unwrap();
    assert_eq!(zero.len(), 1);

    let bad = center.list(&customer, Some("sms"), None, None).await.unwrap_err();
    assert!(matches!(bad, ServiceError::Validation(_)));

    // Operators can look into a customer's feed, customers cannot escape theirs.
    let as_ops = center
        .list(&operator(), None, Some("user:4"), None)
        .await
        .unwrap();
    assert_eq!(as_ops.len(), 4);
    let escaped = center
        .list(&Caller::customer(5, "bo@example.com"), None, Some("user:4"), None)
        .await
        .unwrap();
    assert!(escaped.is_empty());
}

#[tokio::test]
async fn mark_read_is_scoped_and_idempotent() {
    let (center, _, _) = center();
    let stored = center.on_order_created(&order_created(9, 4)).await.unwrap();
    let operator_id = stored[0].id;
    let customer_id = stored[1].id;
    let customer = Caller::customer(4, "ana@example.com");

    assert_eq!(center.unread_count(&customer, None).await.unwrap().count, 1);

    let err = center.mark_read(&customer, operator_id, None).await.unwrap_err();
    assert_eq!(err, ServiceError::not_found("notification", operator_id));
    let err = center
        .mark_read(&Caller::customer(5, "bo@example.com"), customer_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));

    assert!(center.mark_read(&customer, customer_id, None).await.unwrap().is_read);
    assert!(center.mark_read(&customer, customer_id, None).await.unwrap().is_read);
    assert_eq!(center.unread_count(&customer, None).await.unwrap().count, 0);

    assert_eq!(center.unread_count(&operator(), None).await.unwrap().count, 1);
    center.mark_read(&operator(), operator_id, None).await.unwrap();
    assert_eq!(center.unread_count(&operator(), None).await.unwrap().count, 0);
}

#[tokio::test]
async fn consumer_retries_storage_outage_without_duplicates() {
    let (center, repository, mailer) = center();
    let bus = Arc::new(InMemoryEventBus::new("events"));
    let topology = Topology::new("events", "notification-service")
        .bind("order.created")
        .bind("delivery.updated");
    bus.declare_topology(&topology).await.unwrap();

    let dead_letters = RecordingDeadLetters::new();
    let (shutdown, rx) = broadcast::channel(1);
    let task = EventConsumer::new(
        topology,
        bus.clone(),
        Arc::new(FanoutHandler::new(center)),
        Arc::new(dead_letters.clone()),
        rx,
    )
    .with_retry_policy(fast_retries())
    .spawn();

    repository.set_offline(true);
    let payload = FulfillmentEvent::from(order_created(21, 4)).to_json().unwrap();
    bus.publish("order.created", &payload).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(repository.all().is_empty());
    repository.set_offline(false);

    assert!(bus.wait_until_drained("notification-service", Duration::from_secs(2)).await);
    assert_eq!(repository.all().len(), 2);
    assert_eq!(mailer.sent().len(), 1);
    assert!(dead_letters.letters().is_empty());

    shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

fn spawn_consumer(
    bus: &Arc<InMemoryEventBus>,
    topology: Topology,
    handler: Arc<dyn fulfillment_core::EventHandler>,
    shutdown: &broadcast::Sender<()>,
) -> JoinHandle<()> {
    EventConsumer::new(
        topology,
        bus.clone(),
        handler,
        Arc::new(RecordingDeadLetters::new()),
        shutdown.subscribe(),
    )
    .with_retry_policy(fast_retries())
    .spawn()
}

#[tokio::test]
async fn placing_an_order_flows_through_every_service() {
    let bus = Arc::new(InMemoryEventBus::new("events"));

    let orders = InMemoryOrderRepository::new();
    orders.add_medicine(7, "Paracetamol", 5000, 10);
    orders.add_user(1, "ana@example.com", Some("Ana"));
    let engine = OrderEngine::new(Arc::new(orders.clone()), EventPublisher::connected(bus.clone()));

    let deliveries = InMemoryDeliveryRepository::new();
    let machine = DeliveryMachine::new(
        Arc::new(deliveries.clone()),
        EventPublisher::connected(bus.clone()),
        DeliverySettings::default(),
    );

    let (center, notifications, mailer) = center();
    // Both services read the same database in production; mirror the order owner.
    notifications.add_order(1, 1);

    let delivery_topology = Topology::new("events", "delivery-service").bind("order.created");
    let notification_topology = Topology::new("events", "notification-service")
        .bind("order.created")
        .bind("delivery.updated");
    bus.declare_topology(&delivery_topology).await.unwrap();
    bus.declare_topology(&notification_topology).await.unwrap();

    let (shutdown, _) = broadcast::channel(1);
    let tasks = [
        spawn_consumer(
            &bus,
            delivery_topology,
            Arc::new(OrderCreatedHandler::new(machine)),
            &shutdown,
        ),
        spawn_consumer(
            &bus,
            notification_topology,
            Arc::new(FanoutHandler::new(center)),
            &shutdown,
        ),
    ];

    let customer = Caller::customer(1, "ana@example.com");
    let placed = engine
        .place(&customer, &PlaceOrderRequest::new(&[(7, 2)], "12 Main St"))
        .await
        .unwrap();
    assert_eq!(placed.order.id, 1);
    assert_eq!(placed.order.total_amount, Decimal::new(10000, 2));
    assert_eq!(orders.stock(7), Some(8));

    assert!(bus.wait_until_drained("delivery-service", Duration::from_secs(2)).await);
    assert!(bus.wait_until_drained("notification-service", Duration::from_secs(2)).await);

    let created: Vec<FulfillmentEvent> = bus
        .published_events()
        .into_iter()
        .filter(|e| matches!(e, FulfillmentEvent::OrderCreated(_)))
        .collect();
    assert_eq!(created.len(), 1);

    let delivery = deliveries.find(1).await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Pending);
    assert_eq!(delivery.address, "12 Main St");

    let stored = notifications.all();
    let order_notes: Vec<_> = stored.iter().filter(|n| n.kind == "order").collect();
    assert_eq!(order_notes.len(), 2);
    assert!(order_notes.iter().any(|n| n.user_id.is_none()));
    assert!(order_notes.iter().any(|n| n.user_id == Some(1)));
    let delivery_notes: Vec<_> = stored.iter().filter(|n| n.kind == "delivery").collect();
    assert_eq!(delivery_notes.len(), 1);
    assert!(NotificationScope::Customer(1).contains(delivery_notes[0].user_id));

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.starts_with("Hi Ana,"));

    shutdown.send(()).unwrap();
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
