//! # Fulfillment Core
//!
//! Shared contracts for the pharmacy fulfillment services.
//!
//! The order, delivery and notification services never call each other. They
//! coordinate purely by reacting to events on a topic-based broker:
//!
//! ```text
//! ┌───────────────┐  order.created   ┌────────────────────┐
//! │ Order Service │ ───────────────► │  Delivery Service  │
//! └───────────────┘        │         └─────────┬──────────┘
//!                          │                   │ delivery.updated
//!                          ▼                   ▼
//!                 ┌──────────────────────────────────┐
//!                 │       Notification Service       │
//!                 └──────────────────────────────────┘
//! ```
//!
//! This crate holds everything those services must agree on:
//!
//! - [`event`]: the wire envelope ([`FulfillmentEvent`]) and its routing keys
//! - [`event_bus`]: the broker adapter contract ([`EventBus`], [`Topology`],
//!   [`IncomingMessage`]) and the consumer-side [`EventHandler`] trait
//! - [`routing`]: topic-exchange binding semantics
//! - [`identity`]: the caller identity handed over by the edge layer
//! - [`status`]: the delivery lifecycle shared by producer and consumers
//! - [`error`]: the error taxonomy every operation reports through
//! - [`environment`]: injectable clock

#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod event_bus;
pub mod identity;
pub mod routing;
pub mod status;

pub use error::{ServiceError, ServiceResult};
pub use event::{DeliveryUpdated, FulfillmentEvent, LineItemSummary, OrderCreated, OrderDetails};
pub use event_bus::{
    DeadLetter, DeadLetterSink, Disposition, EventBus, EventBusError, EventHandler, HandlerError,
    IncomingMessage, MessageStream, Topology,
};
pub use identity::{Caller, Role};
pub use status::DeliveryStatus;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use rust_decimal::Decimal;

/// Environment module - injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Postgres-backed repositories let the database stamp rows with `NOW()`;
    /// the in-memory repositories used in tests read time from a `Clock`.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
