//! Notification records, scoping and message text.

use chrono::{DateTime, Utc};
use fulfillment_core::{Caller, DeliveryStatus, ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Page size when the caller does not ask for one.
pub const DEFAULT_LIMIT: i64 = 50;

/// Largest page a caller may ask for.
pub const MAX_LIMIT: i64 = 200;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// An order was placed
    Order,
    /// A delivery changed status
    Delivery,
}

impl NotificationKind {
    /// Stored and query-string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Delivery => "delivery",
        }
    }

    /// Parse a `type` filter, ignoring case.
    ///
    /// # Errors
    ///
    /// `Validation` for anything but `order` or `delivery`.
    pub fn parse(input: &str) -> ServiceResult<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "order" => Ok(Self::Order),
            "delivery" => Ok(Self::Delivery),
            other => Err(ServiceError::validation(format!(
                "bad type '{other}', allowed: order, delivery"
            ))),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored notification.
///
/// `user_id` is `None` for operator notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Notification {
    /// Row id
    pub id: i64,
    /// `order` or `delivery`, serialized as `type` like the list filter
    #[serde(rename = "type")]
    pub kind: String,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Order the notification is about
    pub order_id: Option<i64>,
    /// Recipient; `None` means operators
    pub user_id: Option<i64>,
    /// Whether the recipient has seen it
    pub is_read: bool,
    /// When it was stored
    pub created_at: DateTime<Utc>,
}

/// A notification about to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    /// What it is about
    pub kind: NotificationKind,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Order it refers to
    pub order_id: Option<i64>,
    /// Who receives it
    pub scope: NotificationScope,
}

/// Whose notifications an operation sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationScope {
    /// One customer's notifications
    Customer(i64),
    /// Operator notifications (`user_id IS NULL`)
    Operator,
}

impl NotificationScope {
    /// The `user_id` column value for this scope.
    #[must_use]
    pub const fn user_id(&self) -> Option<i64> {
        match self {
            Self::Customer(id) => Some(*id),
            Self::Operator => None,
        }
    }

    /// Whether a row with `user_id` belongs to this scope.
    #[must_use]
    pub fn contains(&self, user_id: Option<i64>) -> bool {
        self.user_id() == user_id
    }

    /// Scope for `caller`, given an optional `scope` query parameter.
    ///
    /// Customers always see their own notifications. Operators see the
    /// operator feed, or a customer's feed with `scope=user:<id>`.
    ///
    /// # Errors
    ///
    /// `Validation` when an operator passes an unrecognized scope.
    pub fn resolve(caller: &Caller, requested: Option<&str>) -> ServiceResult<Self> {
        if !caller.is_operator() {
            return Ok(Self::Customer(caller.user_id));
        }

        let Some(requested) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::Operator);
        };
        if requested.eq_ignore_ascii_case("operator") {
            return Ok(Self::Operator);
        }
        requested
            .strip_prefix("user:")
            .and_then(|id| id.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(Self::Customer)
            .ok_or_else(|| {
                ServiceError::validation(format!(
                    "bad scope '{requested}', expected 'operator' or 'user:<id>'"
                ))
            })
    }
}

/// `GET /notifications` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Optional kind filter
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Optional scope, operators only
    pub scope: Option<String>,
    /// Page size
    pub limit: Option<i64>,
}

/// Query parameters that carry only a scope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeQuery {
    /// Optional scope, operators only
    pub scope: Option<String>,
}

/// `GET /notifications/unread-count` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnreadCount {
    /// Unread notifications in scope
    pub count: i64,
}

/// Clamp a requested page size into `1..=MAX_LIMIT`.
#[must_use]
pub fn clamp_limit(requested: Option<i64>) -> i64 {
    requested.map_or(DEFAULT_LIMIT, |limit| limit.clamp(1, MAX_LIMIT))
}

/// Customer-facing text for a delivery status.
#[must_use]
pub fn delivery_message(order_id: i64, status: DeliveryStatus) -> String {
    match status {
        DeliveryStatus::Pending => format!("Order #{order_id} is being prepared for dispatch"),
        DeliveryStatus::Dispatched => format!("Order #{order_id} has been dispatched"),
        DeliveryStatus::InTransit => format!("Order #{order_id} is on its way"),
        DeliveryStatus::Delivered => format!("Order #{order_id} has been delivered"),
        DeliveryStatus::Failed => {
            format!("Delivery of order #{order_id} failed, our team will contact you")
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn customers_are_pinned_to_their_own_scope() {
        let caller = Caller::customer(4, "ana@example.com");
        assert_eq!(
            NotificationScope::resolve(&caller, Some("operator")).unwrap(),
            NotificationScope::Customer(4)
        );
        assert_eq!(
            NotificationScope::resolve(&caller, Some("user:9")).unwrap(),
            NotificationScope::Customer(4)
        );
    }

    #[test]
    fn operators_may_pick_a_customer() {
        let ops = Caller::operator(1, "ops@example.com");
        assert_eq!(
            NotificationScope::resolve(&ops, None).unwrap(),
            NotificationScope::Operator
        );
        assert_eq!(
            NotificationScope::resolve(&ops, Some("user:9")).unwrap(),
            NotificationScope::Customer(9)
        );
        assert!(NotificationScope::resolve(&ops, Some("user:abc")).is_err());
        assert!(NotificationScope::resolve(&ops, Some("everyone")).is_err());
    }

    #[test]
    fn scope_membership() {
        assert!(NotificationScope::Operator.contains(None));
        assert!(!NotificationScope::Operator.contains(Some(3)));
        assert!(NotificationScope::Customer(3).contains(Some(3)));
        assert!(!NotificationScope::Customer(3).contains(None));
    }

    #[test]
    fn kind_filter() {
        assert_eq!(NotificationKind::parse(" Delivery ").unwrap(), NotificationKind::Delivery);
        assert!(NotificationKind::parse("sms").is_err());
    }

    #[test]
    fn kind_serializes_as_type() {
        let notification = Notification {
            id: 1,
            kind: NotificationKind::Order.as_str().to_string(),
            title: "Order #3 placed".to_string(),
            message: "Thanks".to_string(),
            order_id: Some(3),
            user_id: Some(4),
            is_read: false,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "order");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn delivery_text_names_the_order() {
        assert_eq!(
            delivery_message(12, DeliveryStatus::InTransit),
            "Order #12 is on its way"
        );
    }
}
