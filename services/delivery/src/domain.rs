//! Delivery records and the transition policy.

use chrono::{DateTime, Utc};
use fulfillment_core::{DeliveryStatus, ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};

/// Address stored when a delivery is created before its `order.created` arrives.
pub const UNKNOWN_ADDRESS: &str = "UNKNOWN";

/// The one delivery of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Row id
    pub id: i64,
    /// Order being delivered
    pub order_id: i64,
    /// Current status
    pub status: DeliveryStatus,
    /// Destination, or [`UNKNOWN_ADDRESS`]
    pub address: String,
    /// Assigned courier
    pub courier: String,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Whether the address still awaits the `order.created` backfill.
    #[must_use]
    pub fn address_unknown(&self) -> bool {
        self.address == UNKNOWN_ADDRESS
    }
}

/// Result of handling an `order.created`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Created {
    /// A new row was inserted
    New(Delivery),
    /// A row already existed (possibly with its address just backfilled)
    Existing(Delivery),
}

impl Created {
    /// The delivery row either way.
    #[must_use]
    pub const fn delivery(&self) -> &Delivery {
        match self {
            Self::New(delivery) | Self::Existing(delivery) => delivery,
        }
    }
}

/// Which operator status changes are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Any status may follow any status
    #[default]
    Permissive,
    /// Only the lifecycle table's transitions, see [`DeliveryStatus::can_transition_to`]
    ForwardOnly,
}

impl TransitionPolicy {
    /// Check moving from `current` to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] when the policy forbids it.
    pub fn check(self, current: DeliveryStatus, next: DeliveryStatus) -> ServiceResult<()> {
        match self {
            Self::Permissive => Ok(()),
            Self::ForwardOnly if current.can_transition_to(next) => Ok(()),
            Self::ForwardOnly => Err(ServiceError::validation(format!(
                "cannot move delivery from {current} to {next}"
            ))),
        }
    }
}

/// Body of `PATCH /deliveries/:order_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdate {
    /// Requested status, any case
    #[serde(default)]
    pub status: String,
}
