//! Order service configuration.

use fulfillment_runtime::config::{BrokerConfig, Lookup, PostgresConfig, ServerConfig};

/// Port the order service listens on unless `PORT` says otherwise.
pub const DEFAULT_PORT: u16 = 3003;

/// Everything the order binary reads from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database pool
    pub postgres: PostgresConfig,
    /// Broker connection
    pub broker: BrokerConfig,
    /// HTTP listener
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            postgres: PostgresConfig::from_env(),
            broker: BrokerConfig::from_env(),
            server: ServerConfig::from_env(DEFAULT_PORT),
        }
    }

    /// Load configuration through an arbitrary lookup.
    #[must_use]
    pub fn from_lookup(lookup: &impl Lookup) -> Self {
        Self {
            postgres: PostgresConfig::from_lookup(lookup),
            broker: BrokerConfig::from_lookup(lookup),
            server: ServerConfig::from_lookup(lookup, DEFAULT_PORT),
        }
    }
}
