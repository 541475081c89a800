//! Event bus consumer with explicit message settlement and reconnection.
//!
//! [`EventConsumer`] owns the subscribe-process-reconnect loop for one durable
//! queue. Services only implement [`EventHandler`]; the consumer decides what
//! happens to each message afterwards.
//!
//! # Pattern: Subscribe-Process-Reconnect Loop
//!
//! ```text
//! loop {
//!     declare topology, subscribe:
//!         loop {
//!             decode → handle → settle (ack | requeue | dead-letter + ack)
//!             check shutdown signal
//!         }
//!         if connection lost:
//!             wait and retry
//! }
//! ```
//!
//! # Settlement
//!
//! Every message ends in exactly one disposition:
//!
//! | Outcome | Disposition |
//! |---------|-------------|
//! | payload is not a known event | dead-letter, ack |
//! | handler `Ok` | ack |
//! | transient error, budget left | requeue with backoff |
//! | transient error, budget spent | dead-letter, ack |
//! | permanent error | dead-letter, ack |
//! | dead-letter store unreachable | requeue |
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::new(
//!     Topology::new("events", "delivery-service").bind("order.created"),
//!     event_bus,
//!     Arc::new(OrderCreatedHandler::new(machine)),
//!     Arc::new(DeadLetterQueue::new(pool)),
//!     shutdown_tx.subscribe(),
//! )
//! .with_retry_policy(config.consumer.retry_policy());
//!
//! let handle = consumer.spawn();
//! ```

use crate::metrics::EventBusMetrics;
use crate::retry::RetryPolicy;
use fulfillment_core::{
    DeadLetter, DeadLetterSink, EventBus, EventHandler, FulfillmentEvent, IncomingMessage,
    MessageStream, Topology,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Consumer for one durable queue.
///
/// # Lifecycle
///
/// 1. Created via [`EventConsumer::new`]
/// 2. Spawned as background task via [`EventConsumer::spawn`]
/// 3. Runs until the shutdown signal fires
pub struct EventConsumer {
    topology: Topology,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    dead_letters: Arc<dyn DeadLetterSink>,
    shutdown: broadcast::Receiver<()>,
    retry_policy: RetryPolicy,
    reconnect_delay: Duration,
}

impl EventConsumer {
    /// Create a consumer with the default retry policy and a 5 second reconnect delay.
    #[must_use]
    pub fn new(
        topology: Topology,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn EventHandler>,
        dead_letters: Arc<dyn DeadLetterSink>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            topology,
            event_bus,
            handler,
            dead_letters,
            shutdown,
            retry_policy: RetryPolicy::default(),
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Set the redelivery budget and backoff.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the delay before resubscribing after a lost connection.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Queue name, used as the consumer name in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.topology.queue
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(consumer = %self.name(), bindings = ?self.topology.routing_keys, "Event consumer started");

        loop {
            let bus = Arc::clone(&self.event_bus);
            let topology = self.topology.clone();
            let connect = async move {
                bus.declare_topology(&topology).await?;
                bus.subscribe(&topology).await
            };

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name(), "Event consumer received shutdown signal");
                    break;
                }
                subscribe_result = connect => {
                    match subscribe_result {
                        Ok(stream) => {
                            info!(consumer = %self.name(), "Subscribed to event bus");
                            if self.process_stream(stream).await {
                                break;
                            }
                            warn!(
                                consumer = %self.name(),
                                "Event stream ended, reconnecting in {:?}",
                                self.reconnect_delay
                            );
                        }
                        Err(e) => {
                            error!(
                                consumer = %self.name(),
                                error = %e,
                                "Failed to subscribe to event bus, retrying in {:?}",
                                self.reconnect_delay
                            );
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(consumer = %self.name(), "Event consumer stopped");
    }

    /// Drain `stream` until it ends. Returns `true` if shutdown was requested.
    async fn process_stream(&mut self, mut stream: MessageStream) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name(), "Event consumer received shutdown signal during processing");
                    return true;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => self.process(message).await,
                        Some(Err(e)) => {
                            error!(consumer = %self.name(), error = %e, "Error receiving message from stream");
                        }
                        None => return false,
                    }
                }
            }
        }
    }

    /// Decode, handle and settle one message.
    async fn process(&self, message: IncomingMessage) {
        let attempt = message.attempt();

        let event = match FulfillmentEvent::from_json(message.payload()) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    consumer = %self.name(),
                    routing_key = %message.routing_key(),
                    error = %e,
                    "Undecodable message"
                );
                self.dead_letter(message, format!("undecodable payload: {e}")).await;
                return;
            },
        };

        debug!(
            consumer = %self.name(),
            routing_key = event.routing_key(),
            order_id = event.order_id(),
            attempt,
            "Handling event"
        );

        match self.handler.handle(&event).await {
            Ok(()) => {
                message.ack();
                EventBusMetrics::record_acked(self.name());
            },
            Err(e) if e.is_transient() && self.retry_policy.should_retry(attempt) => {
                let delay = self.retry_policy.delay_for_attempt(attempt.saturating_sub(1));
                warn!(
                    consumer = %self.name(),
                    order_id = event.order_id(),
                    attempt,
                    error = %e,
                    "Handler failed, requeueing in {:?}",
                    delay
                );
                message.requeue(delay);
                EventBusMetrics::record_requeued(self.name());
            },
            Err(e) => {
                error!(
                    consumer = %self.name(),
                    order_id = event.order_id(),
                    attempt,
                    error = %e,
                    "Handler failed permanently"
                );
                self.dead_letter(message, e.to_string()).await;
            },
        }
    }

    async fn dead_letter(&self, message: IncomingMessage, error: String) {
        let letter = DeadLetter {
            consumer: self.name().to_string(),
            routing_key: message.routing_key().to_string(),
            payload: message.payload().to_vec(),
            error,
            attempts: message.attempt(),
        };

        match self.dead_letters.record(letter).await {
            Ok(()) => {
                message.ack();
                EventBusMetrics::record_dead_lettered(self.name());
            },
            Err(e) => {
                error!(
                    consumer = %self.name(),
                    error = %e,
                    "Failed to dead-letter message, requeueing"
                );
                message.requeue(self.retry_policy.max_delay);
                EventBusMetrics::record_requeued(self.name());
            },
        }
    }
}
