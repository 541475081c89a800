//! Delivery service binary.
//!
//! Serves the delivery API and, when a broker is reachable, consumes
//! `order.created` from the `delivery-service` queue.

use anyhow::Context;
use delivery_service::config::QUEUE;
use delivery_service::server::AppState;
use delivery_service::{
    Config, DeliveryMachine, OrderCreatedHandler, PostgresDeliveryRepository, build_router,
};
use fulfillment_core::Topology;
use fulfillment_core::event::ORDER_CREATED;
use fulfillment_postgres::DeadLetterQueue;
use fulfillment_runtime::bootstrap::{connect_database, connect_event_bus, start_metrics};
use fulfillment_runtime::telemetry::{default_filter, init_tracing};
use fulfillment_runtime::{Application, EventConsumer, EventPublisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(&default_filter("delivery_service"));

    info!("Starting delivery service");

    let config = Config::from_env();
    info!(
        courier = %config.delivery.courier,
        transitions = ?config.delivery.transitions,
        "Configuration loaded"
    );
    let _metrics = start_metrics(&config.server).await;

    let pool = connect_database(&config.postgres).await?;
    info!("Database connected");

    let bus = connect_event_bus(&config.broker).await;
    let machine = DeliveryMachine::new(
        Arc::new(PostgresDeliveryRepository::new(pool.clone())),
        EventPublisher::from_bus(bus.clone()),
        config.delivery.clone(),
    );

    let addr = config.server.bind_addr().context("Invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut app = Application::new(
        listener,
        build_router(AppState::new(machine.clone())),
        shutdown_tx.clone(),
    )
    .with_shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout));

    if let Some(bus) = bus {
        let consumer = EventConsumer::new(
            Topology::new(config.broker.exchange.clone(), QUEUE).bind(ORDER_CREATED),
            bus,
            Arc::new(OrderCreatedHandler::new(machine)),
            Arc::new(DeadLetterQueue::new(pool)),
            shutdown_tx.subscribe(),
        )
        .with_retry_policy(config.consumer.retry_policy())
        .with_reconnect_delay(config.consumer.reconnect_delay());
        app = app.with_consumer(consumer);
    } else {
        warn!("No broker: order.created will not be consumed");
    }

    app.run().await.context("HTTP server failed")?;

    info!("Delivery service stopped");
    Ok(())
}
