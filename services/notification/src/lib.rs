//! # Notification Service
//!
//! Consumes `order.created` and `delivery.updated` from the
//! `notification-service` queue and turns them into stored notifications:
//!
//! | Event | Operator feed | Customer feed | Email |
//! |-------|---------------|---------------|-------|
//! | `order.created` | "New order #N" | "Order #N placed" | confirmation |
//! | `delivery.updated` | | status text | |
//!
//! Operator notifications have no `user_id`. Customers can only ever read
//! their own feed; operators read theirs or pick a customer.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod domain;
pub mod fanout;
pub mod handler;
pub mod mailer;
pub mod postgres;
pub mod repository;
pub mod server;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::{Config, MailerConfig, MailerKind};
pub use domain::{Notification, NotificationKind, NotificationScope};
pub use fanout::NotificationCenter;
pub use handler::FanoutHandler;
pub use mailer::{ConsoleMailer, MailError, Mailer, OutboundEmail, SmtpMailer, build_mailer};
pub use postgres::PostgresNotificationRepository;
pub use repository::NotificationRepository;
pub use server::build_router;
