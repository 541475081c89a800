//! Delivery lifecycle states.
//!
//! ```text
//! PENDING ──► DISPATCHED ──► IN_TRANSIT ──► DELIVERED
//!    │            │               │
//!    └────────────┴───────────────┴──────► FAILED
//! ```
//!
//! `DELIVERED` and `FAILED` are terminal. Whether the table is enforced is a
//! policy decision of the delivery service; this type only describes it.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery status, serialized as `SCREAMING_SNAKE_CASE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Created, waiting for a courier
    Pending,
    /// Handed to the courier
    Dispatched,
    /// On its way
    InTransit,
    /// Received by the customer
    Delivered,
    /// Delivery abandoned
    Failed,
}

impl DeliveryStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Dispatched,
        Self::InTransit,
        Self::Delivered,
        Self::Failed,
    ];

    /// Database and wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Dispatched => "DISPATCHED",
            Self::InTransit => "IN_TRANSIT",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether no further transition is expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Forward-only transition table.
    ///
    /// Re-asserting the current status is allowed so that repeated operator
    /// commands stay idempotent.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (*self, next) {
            (Self::Pending, Self::Pending | Self::Dispatched)
            | (Self::Dispatched, Self::Dispatched | Self::InTransit)
            | (Self::InTransit, Self::InTransit | Self::Delivered)
            | (Self::Delivered, Self::Delivered)
            | (Self::Failed, Self::Failed) => true,
            (current, Self::Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    /// Parse operator input: trimmed and case-normalized.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] naming the received value and the
    /// allowed set when the input is empty or not a known status.
    pub fn parse_lenient(input: &str) -> Result<Self, ServiceError> {
        let normalized = input.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(ServiceError::validation("status is required"));
        }
        normalized.parse()
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(DeliveryStatus::as_str).collect();
                ServiceError::validation(format!(
                    "bad status '{s}', allowed: {}",
                    allowed.join(", ")
                ))
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn parse_lenient_normalizes_case_and_whitespace() {
        assert_eq!(
            DeliveryStatus::parse_lenient("  in_transit "),
            Ok(DeliveryStatus::InTransit)
        );
        assert_eq!(
            DeliveryStatus::parse_lenient("delivered"),
            Ok(DeliveryStatus::Delivered)
        );
    }

    #[test]
    fn parse_rejects_unknown_and_empty() {
        let err = DeliveryStatus::parse_lenient("LOST").unwrap_err();
        assert!(err.to_string().contains("LOST"));
        assert!(err.to_string().contains("IN_TRANSIT"));
        assert!(DeliveryStatus::parse_lenient("   ").is_err());
    }

    #[test]
    fn failed_reachable_from_non_terminal_only() {
        assert!(DeliveryStatus::Pending.can_transition_to(DeliveryStatus::Failed));
        assert!(DeliveryStatus::InTransit.can_transition_to(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Delivered.can_transition_to(DeliveryStatus::Failed));
    }

    #[test]
    fn no_skipping_or_going_backwards() {
        assert!(!DeliveryStatus::Pending.can_transition_to(DeliveryStatus::Delivered));
        assert!(!DeliveryStatus::Delivered.can_transition_to(DeliveryStatus::Pending));
        assert!(!DeliveryStatus::Failed.can_transition_to(DeliveryStatus::Dispatched));
        assert!(DeliveryStatus::Dispatched.can_transition_to(DeliveryStatus::InTransit));
    }
}
