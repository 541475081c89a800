//! Application lifecycle management and graceful shutdown.
//!
//! [`Application`] runs one service process:
//!
//! 1. **Startup**: spawn the event consumers (none in degraded mode)
//! 2. **Runtime**: serve HTTP and process events
//! 3. **Shutdown**: stop accepting connections, signal consumers, wait for
//!    them to settle their current message
//!
//! # Example
//!
//! ```rust,ignore
//! let (shutdown_tx, _) = broadcast::channel(1);
//! let app = Application::new(listener, router, shutdown_tx.clone())
//!     .with_consumer(consumer);
//!
//! app.run().await?;
//! ```

use crate::consumer::EventConsumer;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Running service with its background consumers.
pub struct Application {
    listener: tokio::net::TcpListener,
    app: axum::Router,
    consumers: Vec<EventConsumer>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_timeout: Duration,
}

impl Application {
    /// Create a new application instance.
    ///
    /// Consumers added later must subscribe to `shutdown_tx`.
    #[must_use]
    pub const fn new(
        listener: tokio::net::TcpListener,
        app: axum::Router,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            listener,
            app,
            consumers: Vec::new(),
            shutdown_tx,
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    /// Add a background consumer.
    #[must_use]
    pub fn with_consumer(mut self, consumer: EventConsumer) -> Self {
        self.consumers.push(consumer);
        self
    }

    /// How long each consumer gets to stop after the signal (default 10s).
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Run until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the HTTP server fails.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` resolves.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the HTTP server fails.
    pub async fn run_until<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            info!(address = %addr, "Starting HTTP server");
        }

        info!(consumer_count = self.consumers.len(), "Starting event consumers");
        let consumer_handles: Vec<_> = self
            .consumers
            .into_iter()
            .map(|consumer| (consumer.name().to_string(), consumer.spawn()))
            .collect();

        let served = axum::serve(self.listener, self.app)
            .with_graceful_shutdown(signal)
            .await;

        info!("HTTP server stopped, initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(());

        for (name, handle) in consumer_handles {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => info!(consumer = %name, "Consumer stopped gracefully"),
                Ok(Err(e)) => warn!(consumer = %name, error = %e, "Consumer task failed"),
                Err(_) => warn!(consumer = %name, "Consumer shutdown timed out"),
            }
        }

        info!("Graceful shutdown complete");
        served
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::routing::get;
    use fulfillment_core::{EventBus, EventHandler, FulfillmentEvent, ServiceError, Topology};
    use fulfillment_testing::{InMemoryEventBus, RecordingDeadLetters};
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl EventHandler for Noop {
        async fn handle(&self, _event: &FulfillmentEvent) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_until_stops_server_and_consumers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let router = axum::Router::new().route("/health", get(|| async { "ok" }));
        let (shutdown_tx, _) = broadcast::channel(1);

        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new("events"));
        let consumer = EventConsumer::new(
            Topology::new("events", "delivery-service").bind("order.created"),
            bus,
            Arc::new(Noop),
            Arc::new(RecordingDeadLetters::new()),
            shutdown_tx.subscribe(),
        );

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let app = Application::new(listener, router, shutdown_tx)
            .with_consumer(consumer)
            .with_shutdown_timeout(Duration::from_secs(1));
        let running = tokio::spawn(app.run_until(async move {
            let _ = stop_rx.await;
        }));

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(3), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
