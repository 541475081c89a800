//! Wire envelope exchanged between the fulfillment services.
//!
//! Every message on the broker is a UTF-8 JSON object tagged by its `type`
//! field, and the routing key it is published under equals that tag:
//!
//! ```json
//! { "type": "delivery.updated", "orderId": 17, "status": "DISPATCHED" }
//! ```
//!
//! `order.created` is denormalized on purpose: it carries the customer's
//! contact details and the rendered line items so that downstream consumers
//! can send emails and build notifications without calling back into the
//! order service.

use crate::status::DeliveryStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Routing key of [`FulfillmentEvent::OrderCreated`].
pub const ORDER_CREATED: &str = "order.created";

/// Routing key of [`FulfillmentEvent::DeliveryUpdated`].
pub const DELIVERY_UPDATED: &str = "delivery.updated";

/// Tagged union of every event in the fulfillment choreography.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FulfillmentEvent {
    /// An order was committed and its stock reserved.
    #[serde(rename = "order.created")]
    OrderCreated(OrderCreated),

    /// A delivery row was created or changed status.
    #[serde(rename = "delivery.updated")]
    DeliveryUpdated(DeliveryUpdated),
}

/// Payload of `order.created`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    /// Order identifier
    pub order_id: i64,
    /// Buyer
    pub user_id: i64,
    /// Delivery address as entered at checkout
    pub address: String,
    /// Order total, two decimal places
    pub total: Decimal,
    /// Where the confirmation email goes
    pub customer_email: String,
    /// Display name for the email greeting
    pub customer_name: String,
    /// Line items rendered for the email body
    pub order_details: OrderDetails,
}

/// Rendered order summary carried inside `order.created`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    /// Order identifier (repeated for template convenience)
    pub order_id: i64,
    /// Purchased lines
    pub items: Vec<LineItemSummary>,
    /// Order total
    pub total: Decimal,
    /// Delivery address
    pub delivery_address: String,
}

/// One purchased line as shown to the customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemSummary {
    /// Medicine name at order time
    pub name: String,
    /// Units purchased
    pub quantity: i32,
    /// Unit price snapshot
    pub price: Decimal,
}

/// Payload of `delivery.updated`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUpdated {
    /// Order whose delivery changed
    pub order_id: i64,
    /// New delivery status
    pub status: DeliveryStatus,
}

impl FulfillmentEvent {
    /// Routing key this event is published under.
    #[must_use]
    pub const fn routing_key(&self) -> &'static str {
        match self {
            Self::OrderCreated(_) => ORDER_CREATED,
            Self::DeliveryUpdated(_) => DELIVERY_UPDATED,
        }
    }

    /// Order the event refers to.
    #[must_use]
    pub const fn order_id(&self) -> i64 {
        match self {
            Self::OrderCreated(event) => event.order_id,
            Self::DeliveryUpdated(event) => event.order_id,
        }
    }

    /// Serialize to the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; cannot happen for well-formed values.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse from the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON, carries an unknown
    /// `type`, or is missing required fields.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<OrderCreated> for FulfillmentEvent {
    fn from(event: OrderCreated) -> Self {
        Self::OrderCreated(event)
    }
}

impl From<DeliveryUpdated> for FulfillmentEvent {
    fn from(event: DeliveryUpdated) -> Self {
        Self::DeliveryUpdated(event)
    }
}
