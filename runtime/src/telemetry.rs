//! Tracing bootstrap for the service binaries.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for a service: `info`, the service crate at `debug`, sqlx quiet.
#[must_use]
pub fn default_filter(service_crate: &str) -> String {
    format!("info,{service_crate}=debug,fulfillment_runtime=debug,sqlx=warn")
}

/// Install the global subscriber: `RUST_LOG` if set, otherwise `default`.
///
/// Safe to call twice; the second call is a no-op.
pub fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
