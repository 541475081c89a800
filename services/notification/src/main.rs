//! Notification service binary.
//!
//! Serves the notification API and, when a broker is reachable, consumes
//! `order.created` and `delivery.updated` from the `notification-service`
//! queue.

use anyhow::Context;
use fulfillment_core::Topology;
use fulfillment_core::event::{DELIVERY_UPDATED, ORDER_CREATED};
use fulfillment_postgres::DeadLetterQueue;
use fulfillment_runtime::bootstrap::{connect_database, connect_event_bus, start_metrics};
use fulfillment_runtime::telemetry::{default_filter, init_tracing};
use fulfillment_runtime::{Application, EventConsumer};
use notification_service::config::QUEUE;
use notification_service::server::AppState;
use notification_service::{
    Config, FanoutHandler, NotificationCenter, PostgresNotificationRepository, build_mailer,
    build_router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(&default_filter("notification_service"));

    info!("Starting notification service");

    let config = Config::from_env();
    info!(mailer = ?config.mailer.kind, "Configuration loaded");
    let _metrics = start_metrics(&config.server).await;

    let pool = connect_database(&config.postgres).await?;
    info!("Database connected");

    let mailer = build_mailer(&config.mailer).context("Invalid mailer configuration")?;
    let center = NotificationCenter::new(
        Arc::new(PostgresNotificationRepository::new(pool.clone())),
        mailer,
    );

    let bus = connect_event_bus(&config.broker).await;

    let addr = config.server.bind_addr().context("Invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut app = Application::new(
        listener,
        build_router(AppState::new(center.clone(), bus.is_some())),
        shutdown_tx.clone(),
    )
    .with_shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout));

    if let Some(bus) = bus {
        let topology = Topology::new(config.broker.exchange.clone(), QUEUE)
            .bind(ORDER_CREATED)
            .bind(DELIVERY_UPDATED);
        let consumer = EventConsumer::new(
            topology,
            bus,
            Arc::new(FanoutHandler::new(center)),
            Arc::new(DeadLetterQueue::new(pool)),
            shutdown_tx.subscribe(),
        )
        .with_retry_policy(config.consumer.retry_policy())
        .with_reconnect_delay(config.consumer.reconnect_delay());
        app = app.with_consumer(consumer);
    } else {
        warn!("No broker: events will not be consumed");
    }

    app.run().await.context("HTTP server failed")?;

    info!("Notification service stopped");
    Ok(())
}
