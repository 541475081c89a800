//! Storage seam for deliveries.

use crate::domain::{Created, Delivery, TransitionPolicy};
use async_trait::async_trait;
use fulfillment_core::{DeliveryStatus, ServiceResult};

/// Durable delivery storage. At most one row exists per order.
#[async_trait]
pub trait DeliveryRepository: Send + Sync + 'static {
    /// Insert a `PENDING` delivery for `order_id`.
    ///
    /// If the order already has a delivery this is a no-op, except that an
    /// [`UNKNOWN_ADDRESS`](crate::domain::UNKNOWN_ADDRESS) is replaced by `address`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn create_pending(
        &self,
        order_id: i64,
        address: &str,
        courier: &str,
    ) -> ServiceResult<Created>;

    /// Set the status of the order's delivery, creating it with an unknown
    /// address if there is none yet.
    ///
    /// # Errors
    ///
    /// `Validation` when `policy` forbids the transition, storage failures otherwise.
    async fn set_status(
        &self,
        order_id: i64,
        status: DeliveryStatus,
        policy: TransitionPolicy,
        courier: &str,
    ) -> ServiceResult<Delivery>;

    /// The order's delivery, if any.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn find(&self, order_id: i64) -> ServiceResult<Option<Delivery>>;

    /// Whether the storage answers.
    async fn ping(&self) -> bool;
}
