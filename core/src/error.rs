//! Error taxonomy shared by every fulfillment operation.
//!
//! Each variant corresponds to one class of failure the callers can act on:
//!
//! | Variant        | Raised when                                             |
//! |----------------|---------------------------------------------------------|
//! | `Validation`   | malformed input shape, unknown status value             |
//! | `Unauthorized` | no caller identity on an owner-scoped operation         |
//! | `Forbidden`    | a customer calls an operator-only operation             |
//! | `Conflict`     | unknown medicine id, insufficient stock                 |
//! | `NotFound`     | order/delivery/notification absent or not owned         |
//! | `Unavailable`  | broker or mail transport unreachable                    |
//! | `Internal`     | unexpected database failure                             |
//!
//! Downstream-unavailable failures are normally logged where they happen and
//! never returned from a write that already committed; the variant exists for
//! readiness probes and for the adapters themselves.

use std::fmt;
use thiserror::Error;

/// Result alias for fulfillment operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors returned by fulfillment operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Input rejected before any write. The message names the offending field or value.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller identity missing or unreadable.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but lacks the required role.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Business rule rejected the command (nothing was written).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Resource absent, or not visible to the caller.
    #[error("{resource} with id {id} not found")]
    NotFound {
        /// Resource kind (e.g. "order")
        resource: &'static str,
        /// Requested identifier
        id: String,
    },

    /// A downstream collaborator (broker, mail transport) is unreachable.
    #[error("downstream unavailable: {0}")]
    Unavailable(String),

    /// Unexpected failure, typically from the database.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Build a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build a business-rule conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Build a not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Build an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the same input could ever succeed.
    ///
    /// Consumers use this to decide between requeueing a message and
    /// dead-lettering it straight away.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Internal(_))
    }
}
