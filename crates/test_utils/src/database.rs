//! PostgreSQL container harness
//!
//! Starts a throwaway PostgreSQL container, connects a [`PgStore`] to it and
//! creates the catalog tables. Tests built on it need Docker and are marked
//! `#[ignore]`.

use std::sync::Arc;

use domain_catalog::schema;
use infra_db::{DatabaseConfig, DbContext, PgStore};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

const IMAGE_TAG: &str = "16-alpine";
const USER: &str = "catalog";
const PASSWORD: &str = "catalog";
const DATABASE: &str = "catalog_test";

type HarnessError = Box<dyn std::error::Error + Send + Sync>;

/// Connection URL of a container published on `host:port`
pub fn container_url(host: &str, port: u16) -> String {
    format!("postgres://{USER}:{PASSWORD}@{host}:{port}/{DATABASE}")
}

/// A running container plus a store with the catalog schema in place
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    pub config: DatabaseConfig,
    pub store: PgStore,
}

impl TestDatabase {
    /// Starts the container and creates the schema
    ///
    /// # Errors
    ///
    /// Docker failures, connection failures and schema DDL failures
    pub async fn start() -> Result<Self, HarnessError> {
        let container = Postgres::default()
            .with_user(USER)
            .with_password(PASSWORD)
            .with_db_name(DATABASE)
            .with_tag(IMAGE_TAG)
            .start()
            .await?;
        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;

        let config = DatabaseConfig::new(container_url(&host.to_string(), port))
            .max_connections(5)
            .min_connections(1);
        let store = PgStore::connect(&config).await?;
        store.ensure_schema(&schema()).await?;

        Ok(Self {
            _container: container,
            config,
            store,
        })
    }

    /// A fresh unit of work over the container's store
    pub fn context(&self) -> DbContext {
        DbContext::new(self.store.clone())
    }

    /// Empties every catalog table and restarts the identity sequences
    pub async fn clear_data(&self) -> Result<(), HarnessError> {
        let tables = schema()
            .iter()
            .map(|meta| format!("\"{}\"", meta.table))
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!("TRUNCATE TABLE {tables} RESTART IDENTITY CASCADE"))
            .execute(self.store.pool())
            .await?;
        Ok(())
    }
}

static SHARED: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// One container shared by every caller in the test binary
///
/// # Panics
///
/// Panics if the container cannot be started
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED
        .get_or_init(|| async {
            match TestDatabase::start().await {
                Ok(database) => Arc::new(database),
                Err(error) => panic!("shared catalog database failed to start: {error}"),
            }
        })
        .await
        .clone()
}

/// A container owned by a single test
pub async fn create_isolated_test_database() -> Result<TestDatabase, HarnessError> {
    TestDatabase::start().await
}
