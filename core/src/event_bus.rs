//! Event bus abstraction for the fulfillment choreography.
//!
//! This module provides the [`EventBus`] trait that isolates every service
//! from broker connection lifecycle and topology declaration, plus the
//! consumer-side [`EventHandler`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  1. Write rows  │◄─── Source of truth (Postgres)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish to   │◄─── Fire-and-forget, persistent
//! │  topic exchange │
//! └────────┬────────┘
//!          │ routing key
//!     ┌────┴─────┐
//!     ▼          ▼
//! ┌────────┐ ┌────────┐
//! │ queue  │ │ queue  │◄─── One durable queue per service
//! └───┬────┘ └───┬────┘
//!     ▼          ▼
//!  handler    handler  ──► ack  |  requeue(delay)
//! ```
//!
//! # Key Principles
//!
//! - **Database first**: rows are committed before the event is published
//! - **At-least-once delivery**: a message may be delivered more than once
//! - **Manual settlement**: every [`IncomingMessage`] ends in exactly one of
//!   [`IncomingMessage::ack`] or [`IncomingMessage::requeue`]; dropping it
//!   unsettled is treated as a requeue
//! - **One at a time**: the next message of a queue is only delivered after
//!   the current one is settled
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (fulfillment-testing) - for tests
//! - `RedpandaEventBus` (fulfillment-redpanda) - for production (Kafka-compatible)

use crate::error::ServiceError;
use crate::event::FulfillmentEvent;
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to declare exchange, queue or bindings
    #[error("Topology declaration failed for queue '{queue}': {reason}")]
    TopologyFailed {
        /// The queue being declared
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to hand a message to the broker
    #[error("Publish failed for routing key '{routing_key}': {reason}")]
    PublishFailed {
        /// The routing key that failed
        routing_key: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to start consuming a queue
    #[error("Subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// The queue that failed to subscribe
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error while consuming
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Failed to store a dead letter
    #[error("Dead letter rejected: {0}")]
    DeadLetterFailed(String),
}

/// Broker objects a service needs: one exchange, one durable queue, its bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    /// Topic exchange name (shared by all services)
    pub exchange: String,
    /// Durable queue owned by the consuming service
    pub queue: String,
    /// Binding patterns (exact keys or `*`/`#` wildcards)
    pub routing_keys: Vec<String>,
}

impl Topology {
    /// Topology with no bindings yet.
    #[must_use]
    pub fn new(exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_keys: Vec::new(),
        }
    }

    /// Add a binding.
    #[must_use]
    pub fn bind(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_keys.push(routing_key.into());
        self
    }

    /// Whether a message with `routing_key` reaches this queue.
    #[must_use]
    pub fn accepts(&self, routing_key: &str) -> bool {
        self.routing_keys
            .iter()
            .any(|pattern| crate::routing::binding_matches(pattern, routing_key))
    }
}

/// How a delivered message was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; the broker may forget it
    Ack,
    /// Not processed; redeliver after `delay`
    Requeue {
        /// Backoff before redelivery
        delay: Duration,
    },
}

/// A message delivered from a queue, awaiting settlement.
pub struct IncomingMessage {
    routing_key: String,
    payload: Vec<u8>,
    attempt: u32,
    settle: Option<oneshot::Sender<Disposition>>,
}

impl IncomingMessage {
    /// Create a message and the receiver its settlement arrives on.
    ///
    /// Used by bus implementations. `attempt` is 1 for the first delivery.
    #[must_use]
    pub fn new(
        routing_key: impl Into<String>,
        payload: Vec<u8>,
        attempt: u32,
    ) -> (Self, oneshot::Receiver<Disposition>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                routing_key: routing_key.into(),
                payload,
                attempt,
                settle: Some(tx),
            },
            rx,
        )
    }

    /// Routing key the message was published under.
    #[must_use]
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Raw message body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Delivery count, starting at 1.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Acknowledge: the message will not be delivered again.
    pub fn ack(mut self) {
        self.settle(Disposition::Ack);
    }

    /// Negative-acknowledge: the message is redelivered after `delay`.
    pub fn requeue(mut self, delay: Duration) {
        self.settle(Disposition::Requeue { delay });
    }

    fn settle(&mut self, disposition: Disposition) {
        if let Some(tx) = self.settle.take() {
            // Bus side gone means the subscription is closing; it redelivers anyway.
            let _ = tx.send(disposition);
        }
    }
}

impl fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("routing_key", &self.routing_key)
            .field("size", &self.payload.len())
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Interpret the outcome of waiting on a message's settlement.
///
/// A dropped sender (message dropped unsettled) counts as an immediate requeue.
#[must_use]
pub fn disposition_or_requeue(
    outcome: Result<Disposition, oneshot::error::RecvError>,
) -> Disposition {
    outcome.unwrap_or(Disposition::Requeue {
        delay: Duration::ZERO,
    })
}

/// Stream of messages from a subscription.
pub type MessageStream =
    Pin<Box<dyn Stream<Item = Result<IncomingMessage, EventBusError>> + Send>>;

/// Boxed future returned by [`EventBus`] methods.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventBusError>> + Send + 'a>>;

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be shared as `Arc<dyn EventBus>` by publishers and consumers.
///
/// # Thread Safety
///
/// Implementations must serialize concurrent `publish` calls themselves if the
/// underlying client is not safe for concurrent use.
pub trait EventBus: Send + Sync {
    /// Declare the topic exchange, the durable queue and its bindings.
    ///
    /// Declaring the same topology twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TopologyFailed`] if the broker rejects it.
    fn declare_topology<'a>(&'a self, topology: &'a Topology) -> BusFuture<'a, ()>;

    /// Publish `payload` under `routing_key` on the shared exchange.
    ///
    /// Persistence is requested; broker confirmation is not awaited.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the message could not even
    /// be handed to the client (e.g. local queue full, not connected).
    fn publish<'a>(&'a self, routing_key: &'a str, payload: &'a [u8]) -> BusFuture<'a, ()>;

    /// Start consuming the topology's queue.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if consumption cannot start.
    fn subscribe<'a>(&'a self, topology: &'a Topology) -> BusFuture<'a, MessageStream>;
}

/// Processes decoded events for one consuming service.
///
/// Returning `Ok` acknowledges the message. Returning an error leaves the
/// decision to the consumer: transient errors (see
/// [`ServiceError::is_transient`]) are requeued with backoff, everything else
/// is dead-lettered.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented the event from being applied.
    async fn handle(&self, event: &FulfillmentEvent) -> Result<(), ServiceError>;
}

/// Convenience alias for handler results.
pub type HandlerError = ServiceError;

/// A message that will not be retried any more.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadLetter {
    /// Consumer that gave up
    pub consumer: String,
    /// Original routing key
    pub routing_key: String,
    /// Original body
    pub payload: Vec<u8>,
    /// Last error
    pub error: String,
    /// Deliveries attempted
    pub attempts: u32,
}

/// Storage for messages that exhausted their redelivery budget.
#[async_trait]
pub trait DeadLetterSink: Send + Sync + 'static {
    /// Persist a dead letter.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::DeadLetterFailed`] if it could not be stored;
    /// the consumer then requeues the message instead of losing it.
    async fn record(&self, letter: DeadLetter) -> Result<(), EventBusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_accepts_bound_keys_only() {
        let topology = Topology::new("events", "notification-service")
            .bind("order.created")
            .bind("delivery.*");
        assert!(topology.accepts("order.created"));
        assert!(topology.accepts("delivery.updated"));
        assert!(!topology.accepts("order.cancelled"));
    }

    #[tokio::test]
    async fn ack_settles_with_ack() {
        let (message, rx) = IncomingMessage::new("order.created", b"{}".to_vec(), 1);
        message.ack();
        assert_eq!(disposition_or_requeue(rx.await), Disposition::Ack);
    }

    #[tokio::test]
    async fn requeue_carries_delay() {
        let (message, rx) = IncomingMessage::new("order.created", Vec::new(), 2);
        assert_eq!(message.attempt(), 2);
        message.requeue(Duration::from_millis(250));
        assert_eq!(
            disposition_or_requeue(rx.await),
            Disposition::Requeue {
                delay: Duration::from_millis(250)
            }
        );
    }

    #[tokio::test]
    async fn dropping_unsettled_message_requeues() {
        let (message, rx) = IncomingMessage::new("order.created", Vec::new(), 1);
        drop(message);
        assert_eq!(
            disposition_or_requeue(rx.await),
            Disposition::Requeue {
                delay: Duration::ZERO
            }
        );
    }
}
