//! # Order Service
//!
//! Places pharmacy orders and announces them to the rest of the fulfillment
//! choreography.
//!
//! Placing an order is one transaction: the referenced medicines are locked,
//! priced and decremented, and the order and its items are written together.
//! Only after the commit is `order.created` published. A broker outage never
//! fails an order; the event is dropped and logged.
//!
//! ## Modules
//!
//! - [`domain`]: order records and the request body
//! - [`pricing`]: validation, pricing and stock checks (pure)
//! - [`repository`]: storage seam, with [`postgres`] and in-memory implementations
//! - [`engine`]: the operations, independent of HTTP
//! - [`api`] / [`server`]: HTTP surface

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod postgres;
pub mod pricing;
pub mod repository;
pub mod server;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::Config;
pub use domain::{Order, OrderDetail, OrderItem, OrderWithItems, PlaceOrderRequest};
pub use engine::OrderEngine;
pub use postgres::PostgresOrderRepository;
pub use repository::OrderRepository;
pub use server::build_router;
