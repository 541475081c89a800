//! Axum integration shared by the fulfillment services.
//!
//! Each service owns its routes and business logic; this crate supplies the
//! shell around them:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         HTTP shell (this crate)         │  ← bearer claims → Caller
//! │  - identity extraction                  │  ← correlation ids, tracing
//! │  - error → status mapping               │  ← health / readiness
//! ├─────────────────────────────────────────┤
//! │         Service core                    │
//! │  - engines taking a plain `Caller`      │  ← testable without HTTP
//! │  - repositories, publisher              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fulfillment_web::{AppError, CallerIdentity};
//! use axum::{Router, routing::get, Json};
//!
//! async fn list_orders(
//!     State(state): State<AppState>,
//!     CallerIdentity(caller): CallerIdentity,
//! ) -> Result<Json<Vec<OrderWithItems>>, AppError> {
//!     Ok(Json(state.engine.list_mine(&caller).await?))
//! }
//!
//! let app = with_observability(
//!     Router::new().route("/orders", get(list_orders)).with_state(state),
//! );
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{CallerIdentity, CorrelationId, decode_bearer};
pub use middleware::{CORRELATION_ID_HEADER, incoming_correlation_id, with_observability};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
