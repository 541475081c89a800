//! Order service binary.
//!
//! Usage:
//!   cargo run -p order-service
//!
//! Environment:
//!   `DATABASE_URL`, `REDPANDA_BROKERS`, `PORT` (default 3003), `METRICS_PORT`;
//!   see `fulfillment_runtime::config` for the full list.

use anyhow::Context;
use fulfillment_runtime::bootstrap::{connect_database, connect_event_bus, start_metrics};
use fulfillment_runtime::telemetry::{default_filter, init_tracing};
use fulfillment_runtime::{Application, EventPublisher};
use order_service::{Config, OrderEngine, PostgresOrderRepository, build_router, server::AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(&default_filter("order_service"));

    info!("Starting order service");

    let config = Config::from_env();
    let _metrics = start_metrics(&config.server).await;

    let pool = connect_database(&config.postgres).await?;
    info!("Database connected");

    let publisher = EventPublisher::from_bus(connect_event_bus(&config.broker).await);

    let engine = OrderEngine::new(Arc::new(PostgresOrderRepository::new(pool)), publisher);
    let router = build_router(AppState::new(engine));

    let addr = config.server.bind_addr().context("Invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let (shutdown_tx, _) = broadcast::channel(1);
    Application::new(listener, router, shutdown_tx)
        .with_shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout))
        .run()
        .await
        .context("HTTP server failed")?;

    info!("Order service stopped");
    Ok(())
}
