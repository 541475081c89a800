//! Delivery state machine.
//!
//! ```text
//! order.created ──► create PENDING row ──► delivery.updated (current status)
//! operator PATCH ──► update or create row ──► delivery.updated (always)
//! ```
//!
//! Every `delivery.updated` is published after its row is committed, so a
//! consumer that sees the event can always read the delivery.

use crate::config::DeliverySettings;
use crate::domain::{Created, Delivery};
use crate::repository::DeliveryRepository;
use fulfillment_core::{
    Caller, DeliveryStatus, DeliveryUpdated, FulfillmentEvent, OrderCreated, ServiceError,
    ServiceResult,
};
use fulfillment_runtime::EventPublisher;
use std::sync::Arc;
use tracing::{debug, info};

/// Delivery operations.
#[derive(Clone)]
pub struct DeliveryMachine {
    repository: Arc<dyn DeliveryRepository>,
    publisher: EventPublisher,
    settings: DeliverySettings,
}

impl DeliveryMachine {
    /// Create a machine.
    #[must_use]
    pub fn new(
        repository: Arc<dyn DeliveryRepository>,
        publisher: EventPublisher,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            repository,
            publisher,
            settings,
        }
    }

    /// React to `order.created`: open a `PENDING` delivery.
    ///
    /// Redelivery never creates a second row. It backfills an unknown
    /// address and re-announces the row's current status, so an update lost
    /// between commit and publish is sent on the next delivery.
    ///
    /// # Errors
    ///
    /// Storage failures, which the consumer retries.
    pub async fn on_order_created(&self, event: &OrderCreated) -> ServiceResult<Created> {
        let created = self
            .repository
            .create_pending(event.order_id, &event.address, &self.settings.courier)
            .await?;

        match &created {
            Created::New(delivery) => {
                info!(order_id = delivery.order_id, courier = %delivery.courier, "Delivery created");
                self.announce(delivery.order_id, delivery.status).await;
            },
            Created::Existing(delivery) => {
                debug!(
                    order_id = delivery.order_id,
                    status = %delivery.status,
                    "Delivery already exists, re-announcing"
                );
                self.announce(delivery.order_id, delivery.status).await;
            },
        }

        Ok(created)
    }

    /// Operator status change.
    ///
    /// # Errors
    ///
    /// - `Forbidden` for customers
    /// - `Validation` for an unknown status or a transition the policy forbids
    /// - `Internal` when storage fails
    pub async fn set_status(
        &self,
        caller: &Caller,
        order_id: i64,
        status: &str,
    ) -> ServiceResult<Delivery> {
        caller.require_operator()?;
        let status = DeliveryStatus::parse_lenient(status)?;

        let delivery = self
            .repository
            .set_status(
                order_id,
                status,
                self.settings.transitions,
                &self.settings.courier,
            )
            .await?;

        info!(order_id, status = %delivery.status, operator = caller.user_id, "Delivery status set");
        self.announce(order_id, delivery.status).await;

        Ok(delivery)
    }

    /// The order's delivery.
    ///
    /// # Errors
    ///
    /// `NotFound` when the order has no delivery yet.
    pub async fn latest(&self, order_id: i64) -> ServiceResult<Delivery> {
        self.repository
            .find(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("delivery", order_id))
    }

    /// Whether storage answers.
    pub async fn ready(&self) -> bool {
        self.repository.ping().await
    }

    /// Whether events reach a broker.
    #[must_use]
    pub const fn broker_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    async fn announce(&self, order_id: i64, status: DeliveryStatus) {
        let event = FulfillmentEvent::from(DeliveryUpdated { order_id, status });
        self.publisher.publish(&event).await;
    }
}
