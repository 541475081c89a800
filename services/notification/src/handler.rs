//! Consumer side of the notification service.

use crate::fanout::NotificationCenter;
use async_trait::async_trait;
use fulfillment_core::{EventHandler, FulfillmentEvent, HandlerError};

/// Fans out `order.created` and `delivery.updated`.
pub struct FanoutHandler {
    center: NotificationCenter,
}

impl FanoutHandler {
    /// Wrap a center.
    #[must_use]
    pub const fn new(center: NotificationCenter) -> Self {
        Self { center }
    }
}

#[async_trait]
impl EventHandler for FanoutHandler {
    async fn handle(&self, event: &FulfillmentEvent) -> Result<(), HandlerError> {
        match event {
            FulfillmentEvent::OrderCreated(created) => {
                self.center.on_order_created(created).await?;
            },
            FulfillmentEvent::DeliveryUpdated(update) => {
                self.center.on_delivery_updated(update).await?;
            },
        }
        Ok(())
    }
}
