//! Order records and the place-order request.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status every order is created with. Delivery progress lives in the delivery service.
pub const PLACED: &str = "PLACED";

/// A committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    /// Order id
    pub id: i64,
    /// Buyer
    pub user_id: i64,
    /// Σ(unit price × quantity) at purchase time
    pub total_amount: Decimal,
    /// Always [`PLACED`]
    pub status: String,
    /// Address entered at checkout
    pub delivery_address: String,
    /// Commit time
    pub created_at: DateTime<Utc>,
}

/// One purchased line with its price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    /// Line id
    pub id: i64,
    /// Owning order
    pub order_id: i64,
    /// Purchased medicine
    pub medicine_id: i64,
    /// Units
    pub quantity: i32,
    /// Unit price when the order was placed
    pub price: Decimal,
    /// Medicine name, when known
    #[sqlx(default)]
    pub medicine_name: Option<String>,
}

/// Order with its lines, as returned by `GET /orders/:id` and `POST /orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    /// The order row
    pub order: Order,
    /// Its lines
    pub items: Vec<OrderItem>,
}

/// Order flattened with its lines, as listed by `GET /orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithItems {
    /// The order row
    #[serde(flatten)]
    pub order: Order,
    /// Its lines
    pub items: Vec<OrderItem>,
}

impl From<OrderDetail> for OrderWithItems {
    fn from(detail: OrderDetail) -> Self {
        Self {
            order: detail.order,
            items: detail.items,
        }
    }
}

/// Catalog entry as seen by order placement.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Medicine {
    /// Medicine id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Current unit price
    pub price: Decimal,
    /// Units on hand
    pub stock: i32,
}

/// Where the confirmation email goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerContact {
    /// Email address
    pub email: String,
    /// Display name, if the user set one
    pub name: Option<String>,
}

/// Body of `POST /orders`.
///
/// Fields are loosely typed so that malformed input reaches validation and
/// gets a precise message instead of a generic JSON rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceOrderRequest {
    /// Requested lines
    #[serde(default)]
    pub items: Vec<LineRequest>,
    /// Delivery address
    #[serde(default)]
    pub address: String,
}

/// One requested line.
#[derive(Debug, Clone, Deserialize)]
pub struct LineRequest {
    /// Medicine id; a JSON number or a numeric string
    #[serde(rename = "medicineId", alias = "medicine_id", default)]
    pub medicine_id: serde_json::Value,
    /// Units
    #[serde(default)]
    pub quantity: serde_json::Value,
}

impl LineRequest {
    /// Build a line from plain numbers.
    #[must_use]
    pub fn new(medicine_id: i64, quantity: i64) -> Self {
        Self {
            medicine_id: medicine_id.into(),
            quantity: quantity.into(),
        }
    }
}

impl PlaceOrderRequest {
    /// Build a request from `(medicine_id, quantity)` pairs.
    #[must_use]
    pub fn new(lines: &[(i64, i64)], address: impl Into<String>) -> Self {
        Self {
            items: lines
                .iter()
                .map(|&(medicine_id, quantity)| LineRequest::new(medicine_id, quantity))
                .collect(),
            address: address.into(),
        }
    }
}
