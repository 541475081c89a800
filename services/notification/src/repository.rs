//! Storage seam for notifications.

use crate::domain::{NewNotification, Notification, NotificationKind, NotificationScope};
use async_trait::async_trait;
use fulfillment_core::ServiceResult;

/// Durable notification storage.
#[async_trait]
pub trait NotificationRepository: Send + Sync + 'static {
    /// Store every notification in `batch`, all or none.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn insert(&self, batch: &[NewNotification]) -> ServiceResult<Vec<Notification>>;

    /// Notifications in `scope`, optionally of one `kind`, newest first.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn list(
        &self,
        kind: Option<NotificationKind>,
        scope: NotificationScope,
        limit: i64,
    ) -> ServiceResult<Vec<Notification>>;

    /// Mark notification `id` read if it lies in `scope`.
    ///
    /// Returns `None` when there is no such notification in scope.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn mark_read(
        &self,
        id: i64,
        scope: NotificationScope,
    ) -> ServiceResult<Option<Notification>>;

    /// Unread notifications in `scope`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn unread_count(&self, scope: NotificationScope) -> ServiceResult<i64>;

    /// Customer who placed `order_id`, if the order is known.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn order_owner(&self, order_id: i64) -> ServiceResult<Option<i64>>;

    /// Whether the storage answers.
    async fn ping(&self) -> bool;
}
