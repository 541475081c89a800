//! Delivery service configuration.

use crate::domain::TransitionPolicy;
use fulfillment_runtime::config::{
    BrokerConfig, ConsumerConfig, Lookup, PostgresConfig, ServerConfig, process_env, string_or,
};

/// Port the delivery service listens on unless `PORT` says otherwise.
pub const DEFAULT_PORT: u16 = 3004;

/// Courier assigned to new deliveries unless `DELIVERY_COURIER` says otherwise.
pub const DEFAULT_COURIER: &str = "SpeedX";

/// Durable queue of this service.
pub const QUEUE: &str = "delivery-service";

/// Delivery-specific settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySettings {
    /// Courier written on every new delivery
    pub courier: String,
    /// Which status changes operators may make
    pub transitions: TransitionPolicy,
}

impl DeliverySettings {
    /// Load from `lookup`.
    ///
    /// `DELIVERY_TRANSITIONS=forward-only` enforces the lifecycle table; any
    /// other value keeps the permissive default.
    #[must_use]
    pub fn from_lookup(lookup: &impl Lookup) -> Self {
        let transitions = match lookup("DELIVERY_TRANSITIONS")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("forward-only" | "forward_only" | "strict") => TransitionPolicy::ForwardOnly,
            _ => TransitionPolicy::Permissive,
        };

        Self {
            courier: string_or(lookup, "DELIVERY_COURIER", DEFAULT_COURIER),
            transitions,
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            courier: DEFAULT_COURIER.to_string(),
            transitions: TransitionPolicy::Permissive,
        }
    }
}

/// Everything the delivery binary reads from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database pool
    pub postgres: PostgresConfig,
    /// Broker connection
    pub broker: BrokerConfig,
    /// Redelivery policy
    pub consumer: ConsumerConfig,
    /// HTTP listener
    pub server: ServerConfig,
    /// Courier and transition policy
    pub delivery: DeliverySettings,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    /// Load configuration through an arbitrary lookup.
    #[must_use]
    pub fn from_lookup(lookup: &impl Lookup) -> Self {
        Self {
            postgres: PostgresConfig::from_lookup(lookup),
            broker: BrokerConfig::from_lookup(lookup),
            consumer: ConsumerConfig::from_lookup(lookup),
            server: ServerConfig::from_lookup(lookup, DEFAULT_PORT),
            delivery: DeliverySettings::from_lookup(lookup),
        }
    }
}
