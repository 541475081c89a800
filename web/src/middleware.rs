//! Request tracking shared by every service router.
//!
//! [`with_observability`] stacks, outermost first:
//!
//! 1. permissive CORS (browsers call the services directly)
//! 2. correlation ids: reuse a valid `X-Correlation-ID` or mint one, store it
//!    in the request extensions, run the request in a span carrying it, and
//!    echo it on the response
//! 3. `tower-http` request tracing
//!
//! # Example
//!
//! ```ignore
//! use fulfillment_web::with_observability;
//!
//! let app = with_observability(
//!     Router::new().route("/orders", get(list_orders)).with_state(state),
//! );
//! ```

use axum::{
    Router,
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::Response,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Wrap `router` with CORS, correlation ids and HTTP tracing.
#[must_use]
pub fn with_observability<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(propagate_correlation_id))
        .layer(CorsLayer::permissive())
}

/// Correlation id sent by the client, if it is a UUID.
#[must_use]
pub fn incoming_correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

async fn propagate_correlation_id(mut request: Request, next: Next) -> Response {
    let correlation_id = incoming_correlation_id(request.headers()).unwrap_or_else(Uuid::new_v4);
    request.extensions_mut().insert(correlation_id);

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}
