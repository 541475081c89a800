//! Best-effort event publishing.
//!
//! Every committed write in the choreography is followed by a publish, and a
//! failed publish must never unwind the write. [`EventPublisher`] therefore
//! swallows every failure: it logs, bumps a counter and returns a
//! [`PublishOutcome`] the caller is free to ignore.

use crate::metrics::EventBusMetrics;
use fulfillment_core::{EventBus, FulfillmentEvent};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the broker client
    Sent,
    /// Dropped: degraded mode, encoding failure or broker rejection
    Dropped,
}

/// Publishes [`FulfillmentEvent`]s, or drops them when no broker is connected.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Option<Arc<dyn EventBus>>,
}

impl EventPublisher {
    /// Publisher backed by a connected bus.
    #[must_use]
    pub fn connected(bus: Arc<dyn EventBus>) -> Self {
        Self { bus: Some(bus) }
    }

    /// Publisher for degraded mode: every publish is dropped and logged.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self { bus: None }
    }

    /// Publisher from the optional bus returned at startup.
    #[must_use]
    pub fn from_bus(bus: Option<Arc<dyn EventBus>>) -> Self {
        Self { bus }
    }

    /// Whether a broker is attached.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.bus.is_some()
    }

    /// Publish `event` under its routing key.
    pub async fn publish(&self, event: &FulfillmentEvent) -> PublishOutcome {
        let routing_key = event.routing_key();

        let Some(bus) = &self.bus else {
            warn!(
                routing_key,
                order_id = event.order_id(),
                "Broker unavailable, dropping event"
            );
            EventBusMetrics::record_publish_dropped(routing_key);
            return PublishOutcome::Dropped;
        };

        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(routing_key, error = %e, "Failed to encode event, dropping");
                EventBusMetrics::record_publish_dropped(routing_key);
                return PublishOutcome::Dropped;
            },
        };

        match bus.publish(routing_key, &payload).await {
            Ok(()) => {
                debug!(routing_key, order_id = event.order_id(), "Event published");
                EventBusMetrics::record_published(routing_key);
                PublishOutcome::Sent
            },
            Err(e) => {
                warn!(
                    routing_key,
                    order_id = event.order_id(),
                    error = %e,
                    "Failed to publish event"
                );
                EventBusMetrics::record_publish_dropped(routing_key);
                PublishOutcome::Dropped
            },
        }
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("connected", &self.is_connected())
            .finish()
    }
}
