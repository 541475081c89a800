//! Order placement and queries.
//!
//! The engine validates, delegates the atomic write to the repository and
//! then announces the order on the bus. The write is the source of truth:
//! once committed, nothing that happens while publishing can undo it.

use crate::domain::{CustomerContact, Order, OrderDetail, OrderWithItems, PlaceOrderRequest};
use crate::pricing::validate;
use crate::repository::OrderRepository;
use fulfillment_core::identity::email_local_part;
use fulfillment_core::{
    Caller, FulfillmentEvent, LineItemSummary, OrderCreated, OrderDetails, ServiceError,
    ServiceResult,
};
use fulfillment_runtime::metrics::OrderMetrics;
use fulfillment_runtime::{EventPublisher, PublishOutcome};
use std::sync::Arc;
use tracing::{info, warn};

/// Entry point for every order operation.
#[derive(Clone)]
pub struct OrderEngine {
    repository: Arc<dyn OrderRepository>,
    publisher: EventPublisher,
}

impl OrderEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(repository: Arc<dyn OrderRepository>, publisher: EventPublisher) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Place an order for `caller`.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed input
    /// - `Conflict` for an unknown medicine or insufficient stock
    /// - `Internal` when storage fails
    ///
    /// A failed publish is not an error; the order stays committed.
    pub async fn place(
        &self,
        caller: &Caller,
        request: &PlaceOrderRequest,
    ) -> ServiceResult<OrderDetail> {
        let validated = validate(request).inspect_err(|_| {
            OrderMetrics::record_rejected("validation");
        })?;

        let detail = self
            .repository
            .place(caller.user_id, &validated)
            .await
            .inspect_err(|e| {
                OrderMetrics::record_rejected(rejection_reason(e));
            })?;

        OrderMetrics::record_placed();
        info!(
            order_id = detail.order.id,
            user_id = caller.user_id,
            total = %detail.order.total_amount,
            "Order placed"
        );

        let contact = self.contact_for(caller).await;
        let event = order_created(&detail, &contact);
        if self.publisher.publish(&event).await == PublishOutcome::Dropped {
            warn!(order_id = detail.order.id, "order.created not published");
        }

        Ok(detail)
    }

    /// The caller's own orders, newest first.
    ///
    /// # Errors
    ///
    /// `Internal` when storage fails.
    pub async fn list_mine(&self, caller: &Caller) -> ServiceResult<Vec<OrderWithItems>> {
        self.repository.list_for_user(caller.user_id).await
    }

    /// Every order, newest first. Operators only.
    ///
    /// # Errors
    ///
    /// `Forbidden` for customers, `Internal` when storage fails.
    pub async fn list_all(&self, caller: &Caller) -> ServiceResult<Vec<Order>> {
        caller.require_operator()?;
        self.repository.list_all().await
    }

    /// One of the caller's orders.
    ///
    /// # Errors
    ///
    /// `NotFound` when the order does not exist or belongs to someone else.
    pub async fn get(&self, caller: &Caller, order_id: i64) -> ServiceResult<OrderDetail> {
        self.repository
            .find_for_user(order_id, caller.user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", order_id))
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

    /// Stored contact details, falling back to the token claims.
    async fn contact_for(&self, caller: &Caller) -> ResolvedContact {
        let stored = match self.repository.customer_contact(caller.user_id).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(user_id = caller.user_id, error = %e, "Contact lookup failed, using token claims");
                None
            },
        };
        ResolvedContact::resolve(caller, stored)
    }
}

/// Recipient details carried by `order.created`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedContact {
    email: String,
    name: String,
}

impl ResolvedContact {
    fn resolve(caller: &Caller, stored: Option<CustomerContact>) -> Self {
        let (email, name) = match stored {
            Some(contact) if !contact.email.trim().is_empty() => (contact.email, contact.name),
            _ => (caller.email.clone(), caller.name.clone()),
        };
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email_local_part(&email));
        Self { email, name }
    }
}

fn order_created(detail: &OrderDetail, contact: &ResolvedContact) -> FulfillmentEvent {
    let order = &detail.order;
    let items = detail
        .items
        .iter()
        .map(|item| LineItemSummary {
            name: item
                .medicine_name
                .clone()
                .unwrap_or_else(|| format!("Medicine {}", item.medicine_id)),
            quantity: item.quantity,
            price: item.price,
        })
        .collect();

    OrderCreated {
        order_id: order.id,
        user_id: order.user_id,
        address: order.delivery_address.clone(),
        total: order.total_amount,
        customer_email: contact.email.clone(),
        customer_name: contact.name.clone(),
        order_details: OrderDetails {
            order_id: order.id,
            items,
            total: order.total_amount,
            delivery_address: order.delivery_address.clone(),
        },
    }
    .into()
}

const fn rejection_reason(error: &ServiceError) -> &'static str {
    match error {
        ServiceError::Validation(_) => "validation",
        ServiceError::Conflict(_) => "conflict",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_contact_wins_over_claims() {
        let mut caller = Caller::customer(1, "token@example.com");
        caller.name = Some("Token".to_string());
        let contact = ResolvedContact::resolve(
            &caller,
            Some(CustomerContact {
                email: "ana@example.com".to_string(),
                name: None,
            }),
        );
        assert_eq!(contact.email, "ana@example.com");
        assert_eq!(contact.name, "ana");
    }

    #[test]
    fn unknown_user_uses_claims() {
        let mut caller = Caller::customer(1, "bo@example.com");
        assert_eq!(ResolvedContact::resolve(&caller, None).name, "bo");
        caller.name = Some("Bo".to_string());
        assert_eq!(ResolvedContact::resolve(&caller, None).name, "Bo");
    }

    #[test]
    fn rejection_reasons() {
        assert_eq!(rejection_reason(&ServiceError::conflict("x")), "conflict");
        assert_eq!(rejection_reason(&ServiceError::internal("x")), "error");
    }
}
