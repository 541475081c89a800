//! # Fulfillment Testing
//!
//! Testing utilities for the fulfillment services.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: topic exchange with durable queues, in memory
//! - [`RecordingDeadLetters`]: dead-letter sink that keeps what it receives
//! - [`FixedClock`]: deterministic time
//! - [`init_test_tracing`]: log output captured by the test harness
//! - [`bearer_token`]: an `Authorization` header value for a [`Caller`]
//!
//! ## Example
//!
//! ```ignore
//! use fulfillment_testing::{InMemoryEventBus, test_clock};
//!
//! #[tokio::test]
//! async fn order_reaches_delivery() {
//!     let bus = Arc::new(InMemoryEventBus::new("events"));
//!     let engine = OrderEngine::new(repository, EventPublisher::connected(bus.clone()));
//!
//!     engine.place(&caller, request).await?;
//!
//!     assert_eq!(bus.queue_depth("delivery-service"), 1);
//! }
//! ```

mod event_bus;

pub use event_bus::{InMemoryEventBus, RecordingDeadLetters};

use chrono::{DateTime, Utc};
use fulfillment_core::environment::Clock;
use fulfillment_core::{Caller, Role};
use jsonwebtoken::{EncodingKey, Header, encode};

const TEST_SIGNING_KEY: &[u8] = b"fulfillment-test-key";

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use fulfillment_testing::mocks::FixedClock;
    /// use fulfillment_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{FixedClock, test_clock};

/// Route `tracing` output through the test harness's captured writer.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// `Bearer <jwt>` carrying `caller` as claims, signed with a test key.
///
/// The services trust the gateway to verify signatures, so tests only need
/// well-formed claims.
///
/// # Panics
///
/// Never in practice: HMAC signing of JSON claims cannot fail.
#[must_use]
#[allow(clippy::expect_used)]
pub fn bearer_token(caller: &Caller) -> String {
    let role = match caller.role {
        Role::Admin => "ADMIN",
        Role::Customer => "CUSTOMER",
    };
    let mut claims = serde_json::json!({
        "sub": caller.user_id,
        "email": caller.email,
        "role": role,
    });
    if let Some(name) = &caller.name {
        claims["name"] = serde_json::Value::String(name.clone());
    }

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SIGNING_KEY),
    )
    .expect("HS256 test token");
    format!("Bearer {token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

    #[test]
    #[allow(clippy::unwrap_used)]
    fn bearer_token_carries_role() {
        let token = bearer_token(&Caller::operator(3, "ops@example.com"));
        let jwt = token.strip_prefix("Bearer ").unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        let claims = decode::<serde_json::Value>(
            jwt,
            &DecodingKey::from_secret(TEST_SIGNING_KEY),
            &validation,
        )
        .unwrap()
        .claims;

        assert_eq!(claims["role"], "ADMIN");
        assert_eq!(claims["sub"], 3);
    }

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
