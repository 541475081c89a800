//! # Delivery Service
//!
//! Opens a delivery for every placed order and lets operators move it
//! through its lifecycle:
//!
//! ```text
//! PENDING ──► DISPATCHED ──► IN_TRANSIT ──► DELIVERED
//!    └────────────┴───────────────┴──────► FAILED
//! ```
//!
//! Each order has exactly one delivery row. The unique key on `order_id`
//! makes redelivered `order.created` messages harmless, and an operator may
//! update a delivery before its `order.created` arrives (the row is created
//! with an unknown address and backfilled later).

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod domain;
pub mod handler;
pub mod machine;
pub mod postgres;
pub mod repository;
pub mod server;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::{Config, DeliverySettings};
pub use domain::{Created, Delivery, TransitionPolicy};
pub use handler::OrderCreatedHandler;
pub use machine::DeliveryMachine;
pub use postgres::PostgresDeliveryRepository;
pub use repository::DeliveryRepository;
pub use server::build_router;
