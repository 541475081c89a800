//! `PostgreSQL` plumbing shared by the fulfillment services.
//!
//! Every service points at the same database. This crate owns:
//!
//! - the schema, as embedded migrations applied idempotently at startup
//! - pool construction ([`connect`])
//! - the [`DeadLetterQueue`] used by the event consumers
//! - [`DbResultExt`], which turns `sqlx` failures into the shared error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use fulfillment_postgres::{PoolSettings, connect, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/pharmacy", &PoolSettings::default()).await?;
//! migrate(&pool).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dead_letter_queue;

pub use dead_letter_queue::{DeadLetterQueue, DlqStatus, FailedMessage};

use fulfillment_core::{ServiceError, ServiceResult};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Connection pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections in the pool
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
    /// Connections idle longer than this are closed
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Open a connection pool.
///
/// # Errors
///
/// Returns the `sqlx` error if the database cannot be reached.
pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(Some(settings.idle_timeout))
        .connect(database_url)
        .await?;

    tracing::info!(
        host = database_url.split('@').next_back().unwrap_or("unknown"),
        max_connections = settings.max_connections,
        "PostgreSQL connected"
    );
    Ok(pool)
}

/// Apply the embedded schema migrations.
///
/// # Errors
///
/// Returns the migration error if a script fails or the history is inconsistent.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations complete");
    Ok(())
}

/// Whether the database answers a trivial query.
pub async fn ping(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Map `sqlx` results into [`ServiceResult`].
///
/// Database failures become [`ServiceError::Internal`] with a generic message;
/// the driver error is logged here and never reaches a response body.
pub trait DbResultExt<T> {
    /// Convert the error side.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] when `self` is an error.
    fn map_db_err(self) -> ServiceResult<T>;
}

impl<T> DbResultExt<T> for Result<T, sqlx::Error> {
    fn map_db_err(self) -> ServiceResult<T> {
        self.map_err(|e| {
            tracing::error!(error = %e, "Database operation failed");
            ServiceError::internal("database error")
        })
    }
}
