//! # Fulfillment Runtime
//!
//! Process-level machinery every fulfillment service shares:
//!
//! - [`publisher::EventPublisher`]: best-effort publishing that never fails a request
//! - [`consumer::EventConsumer`]: subscribe, handle, settle, reconnect
//! - [`retry::RetryPolicy`]: redelivery budget and startup backoff
//! - [`lifecycle::Application`]: HTTP server plus consumers with graceful shutdown
//! - [`config`], [`bootstrap`], [`telemetry`], [`metrics`]: startup wiring
//!
//! A service binary is mostly glue:
//!
//! ```rust,ignore
//! dotenvy::dotenv().ok();
//! telemetry::init_tracing(&telemetry::default_filter("delivery_service"));
//!
//! let pool = bootstrap::connect_database(&PostgresConfig::from_env()).await?;
//! let bus = bootstrap::connect_event_bus(&BrokerConfig::from_env()).await;
//! let publisher = EventPublisher::from_bus(bus.clone());
//! ```

pub mod bootstrap;
pub mod config;
pub mod consumer;
pub mod lifecycle;
pub mod metrics;
pub mod publisher;
pub mod retry;
pub mod telemetry;

pub use consumer::EventConsumer;
pub use lifecycle::{Application, shutdown_signal};
pub use publisher::{EventPublisher, PublishOutcome};
pub use retry::RetryPolicy;
