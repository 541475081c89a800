//! Order placement against the in-memory repository and bus.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use fulfillment_core::{Caller, FulfillmentEvent, ServiceError, Topology};
use fulfillment_runtime::EventPublisher;
use fulfillment_testing::{InMemoryEventBus, test_clock};
use order_service::mocks::InMemoryOrderRepository;
use order_service::{OrderEngine, PlaceOrderRequest};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

struct Fixture {
    repository: InMemoryOrderRepository,
    bus: Arc<InMemoryEventBus>,
    engine: OrderEngine,
}

fn fixture() -> Fixture {
    let repository = InMemoryOrderRepository::with_clock(Arc::new(test_clock()));
    repository.add_medicine(7, "Ibuprofen 200mg", 5000, 10);
    repository.add_medicine(8, "Vitamin C", 1250, 1);
    repository.add_user(1, "ana@example.com", None);

    let bus = Arc::new(InMemoryEventBus::new("events"));
    let engine = OrderEngine::new(
        Arc::new(repository.clone()),
        EventPublisher::connected(bus.clone()),
    );
    Fixture {
        repository,
        bus,
        engine,
    }
}

fn money(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

#[tokio::test]
async fn placing_an_order_reserves_stock_and_announces_it() {
    let f = fixture();
    let caller = Caller::customer(1, "ana@example.com");

    let detail = f
        .engine
        .place(&caller, &PlaceOrderRequest::new(&[(7, 2)], "12 Main St"))
        .await
        .unwrap();

    assert_eq!(detail.order.total_amount, money("100.00"));
    assert_eq!(detail.order.status, "PLACED");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].price, money("50.00"));
    assert_eq!(f.repository.stock(7), Some(8));

    let events = f.bus.published_events();
    assert_eq!(events.len(), 1);
    let FulfillmentEvent::OrderCreated(created) = &events[0] else {
        panic!("expected order.created, got {events:?}");
    };
    assert_eq!(created.order_id, detail.order.id);
    assert_eq!(created.total, money("100.00"));
    assert_eq!(created.customer_email, "ana@example.com");
    assert_eq!(created.customer_name, "ana");
    assert_eq!(created.order_details.items[0].name, "Ibuprofen 200mg");
    assert_eq!(created.order_details.delivery_address, "12 Main St");
}

#[tokio::test]
async fn unknown_medicine_writes_nothing() {
    let f = fixture();
    let caller = Caller::customer(1, "ana@example.com");

    let err = f
        .engine
        .place(&caller, &PlaceOrderRequest::new(&[(7, 1), (999, 1)], "12 Main St"))
        .await
        .unwrap_err();

    assert_eq!(err, ServiceError::conflict("medicine 999 not found"));
    assert_eq!(f.repository.order_count(), 0);
    assert_eq!(f.repository.stock(7), Some(10));
    assert!(f.bus.published().is_empty());
}

#[tokio::test]
async fn insufficient_stock_writes_nothing() {
    let f = fixture();
    let caller = Caller::customer(1, "ana@example.com");

    let err = f
        .engine
        .place(&caller, &PlaceOrderRequest::new(&[(7, 1), (8, 2)], "12 Main St"))
        .await
        .unwrap_err();

    assert_eq!(err, ServiceError::conflict("insufficient stock for medicine 8"));
    assert_eq!(f.repository.stock(7), Some(10));
    assert_eq!(f.repository.stock(8), Some(1));
    assert!(f.bus.published().is_empty());
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let f = fixture();
    let first = Caller::customer(1, "ana@example.com");
    let second = Caller::customer(2, "bo@example.com");
    let request = PlaceOrderRequest::new(&[(7, 6)], "12 Main St");

    let (a, b) = tokio::join!(
        f.engine.place(&first, &request),
        f.engine.place(&second, &request)
    );

    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    assert_eq!(f.repository.stock(7), Some(4));
    assert_eq!(f.repository.order_count(), 1);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_storage() {
    let f = fixture();
    f.repository.set_offline(true);
    let caller = Caller::customer(1, "ana@example.com");

    let err = f
        .engine
        .place(&caller, &PlaceOrderRequest::new(&[(7, 1)], "x"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn broker_outage_does_not_fail_the_order() {
    let f = fixture();
    f.bus.set_fail_publishes(true);
    let caller = Caller::customer(1, "ana@example.com");

    let detail = f
        .engine
        .place(&caller, &PlaceOrderRequest::new(&[(7, 1)], "12 Main St"))
        .await
        .unwrap();
    assert_eq!(detail.order.total_amount, money("50.00"));
    assert_eq!(f.repository.order_count(), 1);

    let degraded = OrderEngine::new(Arc::new(f.repository.clone()), EventPublisher::disconnected());
    degraded
        .place(&caller, &PlaceOrderRequest::new(&[(7, 1)], "12 Main St"))
        .await
        .unwrap();
    assert_eq!(f.repository.stock(7), Some(8));
}

#[tokio::test]
async fn unknown_user_falls_back_to_token_claims() {
    let f = fixture();
    let mut caller = Caller::customer(42, "carla@example.com");
    caller.name = Some("Carla".to_string());

    f.engine
        .place(&caller, &PlaceOrderRequest::new(&[(7, 1)], "12 Main St"))
        .await
        .unwrap();

    let FulfillmentEvent::OrderCreated(created) = &f.bus.published_events()[0] else {
        panic!("expected order.created");
    };
    assert_eq!(created.customer_email, "carla@example.com");
    assert_eq!(created.customer_name, "Carla");
}

#[tokio::test]
async fn queries_are_owner_scoped() {
    let f = fixture();
    let ana = Caller::customer(1, "ana@example.com");
    let bo = Caller::customer(2, "bo@example.com");
    let ops = Caller::operator(99, "ops@example.com");

    let first = f
        .engine
        .place(&ana, &PlaceOrderRequest::new(&[(7, 1)], "12 Main St"))
        .await
        .unwrap();
    let second = f
        .engine
        .place(&ana, &PlaceOrderRequest::new(&[(7, 2)], "12 Main St"))
        .await
        .unwrap();
    f.engine
        .place(&bo, &PlaceOrderRequest::new(&[(8, 1)], "9 Side Rd"))
        .await
        .unwrap();

    let mine = f.engine.list_mine(&ana).await.unwrap();
    let ids: Vec<i64> = mine.iter().map(|o| o.order.id).collect();
    assert_eq!(ids, vec![second.order.id, first.order.id]);
    assert_eq!(mine[0].items[0].medicine_name.as_deref(), Some("Ibuprofen 200mg"));

    assert_eq!(
        f.engine.get(&bo, first.order.id).await.unwrap_err(),
        ServiceError::not_found("order", first.order.id)
    );
    assert_eq!(f.engine.get(&ana, first.order.id).await.unwrap(), first);

    assert!(matches!(
        f.engine.list_all(&ana).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert_eq!(f.engine.list_all(&ops).await.unwrap().len(), 3);
}

#[tokio::test]
async fn order_created_reaches_bound_queues() {
    let f = fixture();
    let topology = Topology::new("events", "delivery-service").bind("order.created");
    fulfillment_core::EventBus::declare_topology(f.bus.as_ref(), &topology)
        .await
        .unwrap();

    f.engine
        .place(
            &Caller::customer(1, "ana@example.com"),
            &PlaceOrderRequest::new(&[(7, 1)], "12 Main St"),
        )
        .await
        .unwrap();

    assert_eq!(f.bus.queue_depth("delivery-service"), 1);
}
