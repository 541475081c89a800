//! Notification fan-out and queries.
//!
//! Every consumed event becomes one or more stored notifications. For a new
//! order that is one operator notification, one customer notification and a
//! confirmation email; for a delivery change it is one customer
//! notification. Storage failures propagate so the message is redelivered.
//! Email failures do not: the notifications are already committed.

use crate::domain::{
    NewNotification, Notification, NotificationKind, NotificationScope, UnreadCount,
    clamp_limit, delivery_message,
};
use crate::mailer::{Mailer, OutboundEmail};
use crate::repository::NotificationRepository;
use fulfillment_core::{Caller, DeliveryUpdated, OrderCreated, ServiceError, ServiceResult};
use fulfillment_runtime::metrics::NotificationMetrics;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for every notification operation.
#[derive(Clone)]
pub struct NotificationCenter {
    repository: Arc<dyn NotificationRepository>,
    mailer: Arc<dyn Mailer>,
}

impl NotificationCenter {
    /// Create a center.
    #[must_use]
    pub fn new(repository: Arc<dyn NotificationRepository>, mailer: Arc<dyn Mailer>) -> Self {
        Self { repository, mailer }
    }

    /// Fan out a placed order.
    ///
    /// # Errors
    ///
    /// `Internal` when the notifications cannot be stored.
    pub async fn on_order_created(&self, order: &OrderCreated) -> ServiceResult<Vec<Notification>> {
        let stored = self.repository.insert(&order_notifications(order)).await?;
        for notification in &stored {
            NotificationMetrics::record_created(NotificationKind::Order.as_str());
            debug!(notification_id = notification.id, order_id = order.order_id, "Notification stored");
        }

        self.send_confirmation(order).await;
        Ok(stored)
    }

    /// Tell the order's owner about a delivery change.
    ///
    /// Returns `None` when the order is unknown here; the event is skipped.
    ///
    /// # Errors
    ///
    /// `Internal` when storage fails.
    pub async fn on_delivery_updated(
        &self,
        update: &DeliveryUpdated,
    ) -> ServiceResult<Option<Notification>> {
        let Some(user_id) = self.repository.order_owner(update.order_id).await? else {
            debug!(order_id = update.order_id, status = %update.status, "No owner for order, skipping");
            return Ok(None);
        };

        let new = NewNotification {
            kind: NotificationKind::Delivery,
            title: format!("Delivery update for order #{}", update.order_id),
            message: delivery_message(update.order_id, update.status),
            order_id: Some(update.order_id),
            scope: NotificationScope::Customer(user_id),
        };
        let stored = self.repository.insert(std::slice::from_ref(&new)).await?;
        NotificationMetrics::record_created(NotificationKind::Delivery.as_str());
        info!(order_id = update.order_id, user_id, status = %update.status, "Delivery notification stored");

        Ok(stored.into_iter().next())
    }

    /// Notifications visible to `caller`, newest first.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad `type` or `scope`, `Internal` when storage fails.
    pub async fn list(
        &self,
        caller: &Caller,
        kind: Option<&str>,
        scope: Option<&str>,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<Notification>> {
        let kind = kind
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(NotificationKind::parse)
            .transpose()?;
        let scope = NotificationScope::resolve(caller, scope)?;
        self.repository.list(kind, scope, clamp_limit(limit)).await
    }

    /// Mark one notification read. Marking twice is harmless.
    ///
    /// # Errors
    ///
    /// `NotFound` when the notification does not exist in the caller's scope.
    pub async fn mark_read(
        &self,
        caller: &Caller,
        id: i64,
        scope: Option<&str>,
    ) -> ServiceResult<Notification> {
        let scope = NotificationScope::resolve(caller, scope)?;
        self.repository
            .mark_read(id, scope)
            .await?
            .ok_or_else(|| ServiceError::not_found("notification", id))
    }

    /// Unread notifications in the caller's scope.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad `scope`, `Internal` when storage fails.
    pub async fn unread_count(&self, caller: &Caller, scope: Option<&str>) -> ServiceResult<UnreadCount> {
        let scope = NotificationScope::resolve(caller, scope)?;
        let count = self.repository.unread_count(scope).await?;
        Ok(UnreadCount { count })
    }

    /// Whether storage answers.
    pub async fn ready(&self) -> bool {
        self.repository.ping().await
    }

    async fn send_confirmation(&self, order: &OrderCreated) {
        if order.customer_email.trim().is_empty() {
            debug!(order_id = order.order_id, "No customer email, skipping confirmation");
            return;
        }

        let email = OutboundEmail::order_confirmation(order);
        match self.mailer.send(&email).await {
            Ok(()) => info!(order_id = order.order_id, to = %email.to, "Confirmation email sent"),
            Err(e) => {
                NotificationMetrics::record_email_failed();
                warn!(order_id = order.order_id, to = %email.to, error = %e, "Confirmation email failed");
            },
        }
    }
}

fn order_notifications(order: &OrderCreated) -> [NewNotification; 2] {
    let units: i64 = order
        .order_details
        .items
        .iter()
        .map(|item| i64::from(item.quantity))
        .sum();
    let noun = if units == 1 { "item" } else { "items" };

    [
        NewNotification {
            kind: NotificationKind::Order,
            title: format!("New order #{}", order.order_id),
            message: format!(
                "{} <{}> ordered {units} {noun}, total {}",
                order.customer_name, order.customer_email, order.total
            ),
            order_id: Some(order.order_id),
            scope: NotificationScope::Operator,
        },
        NewNotification {
            kind: NotificationKind::Order,
            title: format!("Order #{} placed", order.order_id),
            message: format!(
                "We received your order of {units} {noun} ({}). It will be delivered to {}.",
                order.total, order.address
            ),
            order_id: Some(order.order_id),
            scope: NotificationScope::Customer(order.user_id),
        },
    ]
}
