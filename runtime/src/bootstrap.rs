//! Startup wiring shared by the service binaries.
//!
//! The database is required: startup retries with backoff and then fails.
//! The broker is optional: if it cannot be reached the service runs in
//! degraded mode instead of crash-looping.

use crate::config::{BrokerConfig, PostgresConfig, ServerConfig};
use crate::metrics::MetricsServer;
use crate::retry::{RetryPolicy, retry_with_backoff};
use anyhow::Context;
use fulfillment_core::EventBus;
use fulfillment_redpanda::RedpandaEventBus;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Connect to Postgres (with retry) and apply migrations.
///
/// # Errors
///
/// Returns an error if the database stays unreachable or a migration fails.
pub async fn connect_database(config: &PostgresConfig) -> anyhow::Result<PgPool> {
    let settings = config.pool_settings();
    let policy = RetryPolicy::builder()
        .max_retries(config.connect_retries)
        .initial_delay(Duration::from_millis(500))
        .max_delay(Duration::from_secs(10))
        .build();

    let pool = retry_with_backoff(policy, || fulfillment_postgres::connect(&config.url, &settings))
        .await
        .context("Failed to connect to PostgreSQL")?;

    fulfillment_postgres::migrate(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

/// Connect to the broker, or return `None` for degraded mode.
pub async fn connect_event_bus(config: &BrokerConfig) -> Option<Arc<dyn EventBus>> {
    if !config.enabled {
        warn!("Broker disabled by configuration, running in degraded mode");
        return None;
    }

    let connected = RedpandaEventBus::builder()
        .brokers(config.brokers.clone())
        .exchange(config.exchange.clone())
        .producer_acks(config.producer_acks.clone())
        .compression(config.compression.clone())
        .timeout(config.timeout())
        .auto_offset_reset(config.auto_offset_reset.clone())
        .connect()
        .await;

    match connected {
        Ok(bus) => Some(Arc::new(bus)),
        Err(e) => {
            warn!(
                brokers = %config.brokers,
                error = %e,
                "Broker unreachable, running in degraded mode: events will be dropped and nothing consumed"
            );
            None
        },
    }
}

/// Start the Prometheus exporter when a metrics port is configured.
///
/// Exporter failures are logged; metrics are never worth refusing to start.
pub async fn start_metrics(config: &ServerConfig) -> Option<MetricsServer> {
    let addr = config.metrics_addr()?;
    let mut server = MetricsServer::new(addr);

    if let Err(e) = server.start() {
        warn!(error = %e, "Failed to install metrics recorder");
        return None;
    }
    match server.serve().await {
        Ok(_handle) => {
            info!(%addr, "Metrics exporter enabled");
            Some(server)
        },
        Err(e) => {
            warn!(%addr, error = %e, "Failed to start metrics exporter");
            None
        },
    }
}
