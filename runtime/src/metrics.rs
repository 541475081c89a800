//! Prometheus metrics for the fulfillment services.
//!
//! Every service records counters through the small recorder structs below
//! ([`OrderMetrics`], [`EventBusMetrics`], [`NotificationMetrics`]). When a
//! metrics port is configured, [`MetricsServer`] installs the Prometheus
//! recorder and serves the scrape endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use fulfillment_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let _handle = server.serve().await?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use axum::{Router, routing::get};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

pub use metrics::counter;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// `serve` called before `start`
    #[error("Metrics recorder is not installed")]
    NotStarted,
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once served.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the Prometheus recorder and describe all counters.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a different recorder is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Bind the scrape endpoint and serve it in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::NotStarted`] without an installed recorder, or
    /// [`MetricsError::Bind`] if the address is taken.
    pub async fn serve(&self) -> Result<tokio::task::JoinHandle<()>, MetricsError> {
        let handle = self.handle.clone().ok_or(MetricsError::NotStarted)?;
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        let router = Router::new().route("/metrics", get(move || async move { handle.render() }));

        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );

        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "Metrics server stopped");
            }
        }))
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("orders.placed", "Orders committed");
    describe_counter!("orders.rejected", "Order placements rejected, by reason");

    describe_counter!("events.published", "Events handed to the broker");
    describe_counter!(
        "events.publish_dropped",
        "Events dropped because the broker was unavailable"
    );

    describe_counter!("consumer.acked", "Messages processed and acknowledged");
    describe_counter!("consumer.requeued", "Messages requeued for redelivery");
    describe_counter!("consumer.dead_lettered", "Messages moved to the dead-letter queue");

    describe_counter!(
        "notifications.created",
        "Notification rows written, by kind"
    );
    describe_counter!(
        "notifications.email_failed",
        "Confirmation emails the mail transport rejected"
    );
}

/// Order placement metrics recorder.
pub struct OrderMetrics;

impl OrderMetrics {
    /// Record a committed order.
    pub fn record_placed() {
        counter!("orders.placed").increment(1);
    }

    /// Record a rejected placement.
    pub fn record_rejected(reason: &'static str) {
        counter!("orders.rejected", "reason" => reason).increment(1);
    }
}

/// Event bus metrics recorder.
pub struct EventBusMetrics;

impl EventBusMetrics {
    /// Record an event handed to the broker.
    pub fn record_published(routing_key: &'static str) {
        counter!("events.published", "routing_key" => routing_key).increment(1);
    }

    /// Record an event dropped in degraded mode or on publish failure.
    pub fn record_publish_dropped(routing_key: &'static str) {
        counter!("events.publish_dropped", "routing_key" => routing_key).increment(1);
    }

    /// Record an acknowledged message.
    pub fn record_acked(consumer: &str) {
        counter!("consumer.acked", "consumer" => consumer.to_string()).increment(1);
    }

    /// Record a requeued message.
    pub fn record_requeued(consumer: &str) {
        counter!("consumer.requeued", "consumer" => consumer.to_string()).increment(1);
    }

    /// Record a dead-lettered message.
    pub fn record_dead_lettered(consumer: &str) {
        counter!("consumer.dead_lettered", "consumer" => consumer.to_string()).increment(1);
    }
}

/// Notification fan-out metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a notification row.
    pub fn record_created(kind: &'static str) {
        counter!("notifications.created", "kind" => kind).increment(1);
    }

    /// Record a failed confirmation email.
    pub fn record_email_failed() {
        counter!("notifications.email_failed").increment(1);
    }
}
