//! Custom Axum extractors.
//!
//! - [`CallerIdentity`]: the verified caller, read from the bearer token claims
//! - [`CorrelationId`]: the request correlation id
//!
//! The gateway in front of the services verifies token signatures. By the
//! time a request reaches a service the token is trusted, so the extractor
//! decodes the JWT without checking the signature and reads `sub`, `email`,
//! `name` and `role`.
//!
//! # Examples
//!
//! ```ignore
//! use fulfillment_web::extractors::{CallerIdentity, CorrelationId};
//!
//! async fn handler(
//!     CallerIdentity(caller): CallerIdentity,
//!     correlation_id: CorrelationId,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, user_id = caller.user_id, "Processing request");
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::incoming_correlation_id;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use fulfillment_core::{Caller, Role, ServiceError, ServiceResult};
use jsonwebtoken::dangerous::insecure_decode;
use jsonwebtoken::errors::ErrorKind;
use serde::Deserialize;
use uuid::Uuid;

/// Authenticated caller, extracted from `Authorization: Bearer <token>`.
///
/// Rejects with `401 UNAUTHORIZED` when the header is missing or the claims
/// cannot be read.
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

        decode_bearer(header).map(Self).map_err(AppError::from)
    }
}

/// Token claims the services rely on.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: Subject,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// `sub` is numeric in tokens we issue, but tolerate a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Subject {
    Number(i64),
    Text(String),
}

impl Subject {
    fn user_id(&self) -> Option<i64> {
        match self {
            Self::Number(id) => Some(*id),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Decode an `Authorization` header value into a [`Caller`].
///
/// # Errors
///
/// Returns [`ServiceError::Unauthorized`] if the header is not a bearer
/// token, the JWT cannot be decoded, or `sub` is not a positive integer.
pub fn decode_bearer(header: &str) -> ServiceResult<Caller> {
    let unauthorized = |reason: &str| ServiceError::Unauthorized(reason.to_string());

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| unauthorized("missing bearer token"))?;

    let claims = insecure_decode::<Claims>(token)
        .map_err(|err| match err.kind() {
            ErrorKind::Json(_) => unauthorized("unreadable token claims"),
            _ => unauthorized("malformed token"),
        })?
        .claims;

    let user_id = claims
        .sub
        .user_id()
        .filter(|id| *id > 0)
        .ok_or_else(|| unauthorized("invalid subject claim"))?;

    let role = match claims.role.as_deref() {
        Some(role) if role.eq_ignore_ascii_case("ADMIN") => Role::Admin,
        _ => Role::Customer,
    };

    Ok(Caller {
        user_id,
        email: claims.email.unwrap_or_default(),
        name: claims.name.filter(|n| !n.trim().is_empty()),
        role,
    })
}

/// Correlation ID for request tracing.
///
/// Reads the id stored by [`with_observability`](crate::middleware::with_observability),
/// then the `X-Correlation-ID` header, and generates a new UUID v4 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .or_else(|| incoming_correlation_id(&parts.headers))
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}
