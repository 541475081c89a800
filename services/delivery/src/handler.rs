//! Consumer side of the delivery service.

use crate::machine::DeliveryMachine;
use async_trait::async_trait;
use fulfillment_core::{EventHandler, FulfillmentEvent, HandlerError};

/// Creates deliveries from `order.created`.
///
/// Storage errors are returned as-is, so the consumer requeues the message
/// and retries with backoff.
pub struct OrderCreatedHandler {
    machine: DeliveryMachine,
}

impl OrderCreatedHandler {
    /// Wrap a machine.
    #[must_use]
    pub const fn new(machine: DeliveryMachine) -> Self {
        Self { machine }
    }
}

#[async_trait]
impl EventHandler for OrderCreatedHandler {
    async fn handle(&self, event: &FulfillmentEvent) -> Result<(), HandlerError> {
        match event {
            FulfillmentEvent::OrderCreated(created) => {
                self.machine.on_order_created(created).await?;
                Ok(())
            },
            other => {
                tracing::debug!(routing_key = other.routing_key(), "Ignoring event");
                Ok(())
            },
        }
    }
}
