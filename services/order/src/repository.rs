//! Storage seam for orders.

use crate::domain::{CustomerContact, Order, OrderDetail, OrderWithItems};
use crate::pricing::ValidatedOrder;
use async_trait::async_trait;
use fulfillment_core::ServiceResult;

/// Durable order storage.
///
/// `place` is the only write. It must be atomic: either the order, its items
/// and every stock decrement are committed together, or nothing is.
#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    /// Price, reserve stock and persist a validated order for `user_id`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Conflict`](fulfillment_core::ServiceError::Conflict)
    ///   for an unknown medicine or insufficient stock
    /// - [`ServiceError::Internal`](fulfillment_core::ServiceError::Internal)
    ///   for storage failures
    async fn place(&self, user_id: i64, order: &ValidatedOrder) -> ServiceResult<OrderDetail>;

    /// Contact details of `user_id`, if the user is known.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn customer_contact(&self, user_id: i64) -> ServiceResult<Option<CustomerContact>>;

    /// Orders of `user_id` with their items, newest first.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn list_for_user(&self, user_id: i64) -> ServiceResult<Vec<OrderWithItems>>;

    /// Every order, newest first, without items.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn list_all(&self) -> ServiceResult<Vec<Order>>;

    /// One order with its items, only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn find_for_user(&self, order_id: i64, user_id: i64)
    -> ServiceResult<Option<OrderDetail>>;

    /// Whether the storage answers.
    async fn ping(&self) -> bool;
}
