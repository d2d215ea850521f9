//! PostgreSQL pool settings
//!
//! [`DatabaseConfig`] carries everything [`create_pool`] hands to sqlx. The
//! probe binary and the test container helper build it; [`DatabaseConfig::from_env`]
//! layers `CATALOG_DB_*` variables over the defaults.

use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::DatabaseError;

/// Pool handed to [`crate::PgStore`]
pub type DatabasePool = PgPool;

/// Prefix of the environment variables read by [`DatabaseConfig::from_env`]
pub const ENV_PREFIX: &str = "CATALOG_DB";

const DEFAULT_URL: &str = "postgres://localhost/catalog";

/// Connection target and pool limits of the catalog store
///
/// ```rust
/// use infra_db::DatabaseConfig;
/// use std::time::Duration;
///
/// let config = DatabaseConfig::new("postgres://db/catalog")
///     .max_connections(4)
///     .acquire_timeout(Duration::from_secs(5));
/// assert_eq!(config.min_connections, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Bound on the wait for a free connection; the only timeout the
    /// repository layer inherits
    pub acquire_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
}

/// Shape of the `CATALOG_DB_*` variables; durations are whole seconds
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    url: Option<String>,
    max_connections: Option<u32>,
    min_connections: Option<u32>,
    acquire_timeout_secs: Option<u64>,
    max_lifetime_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
}

impl DatabaseConfig {
    /// Settings for `url` with a pool of 2 to 10 connections
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
        }
    }

    /// Reads `CATALOG_DB_URL`, `CATALOG_DB_MAX_CONNECTIONS`,
    /// `CATALOG_DB_MIN_CONNECTIONS` and the `CATALOG_DB_*_SECS` timeouts
    ///
    /// Variables that are not set leave the default in place.
    ///
    /// # Errors
    ///
    /// A variable that does not parse into its field's type
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .try_parsing(true);
        let overrides = config::Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize::<EnvOverrides>()?;
        Ok(overrides.layer_over(Self::default()))
    }

    pub fn max_connections(self, max_connections: u32) -> Self {
        Self {
            max_connections,
            ..self
        }
    }

    pub fn min_connections(self, min_connections: u32) -> Self {
        Self {
            min_connections,
            ..self
        }
    }

    pub fn acquire_timeout(self, acquire_timeout: Duration) -> Self {
        Self {
            acquire_timeout,
            ..self
        }
    }

    pub fn max_lifetime(self, max_lifetime: Duration) -> Self {
        Self {
            max_lifetime,
            ..self
        }
    }

    pub fn idle_timeout(self, idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            ..self
        }
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .max_lifetime(self.max_lifetime)
            .idle_timeout(self.idle_timeout)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl EnvOverrides {
    fn layer_over(self, base: DatabaseConfig) -> DatabaseConfig {
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map_or(fallback, Duration::from_secs)
        };
        DatabaseConfig {
            url: self.url.unwrap_or(base.url),
            max_connections: self.max_connections.unwrap_or(base.max_connections),
            min_connections: self.min_connections.unwrap_or(base.min_connections),
            acquire_timeout: secs(self.acquire_timeout_secs, base.acquire_timeout),
            max_lifetime: secs(self.max_lifetime_secs, base.max_lifetime),
            idle_timeout: secs(self.idle_timeout_secs, base.idle_timeout),
        }
    }
}

/// Opens the pool and waits for the first connection
///
/// # Errors
///
/// [`DatabaseError::ConnectionFailed`] when the server cannot be reached, or
/// [`DatabaseError::PoolExhausted`] when the acquire timeout elapses first
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "opening catalog pool"
    );
    let pool = config
        .options()
        .connect(&config.url)
        .await
        .map_err(DatabaseError::from)?;
    info!("catalog pool ready");
    Ok(pool)
}
