//! Catalog Probe - database round-trip check
//!
//! Connects to PostgreSQL, creates the catalog tables if they are missing and
//! runs one fuel insert/read/delete round trip through the generic
//! repository.
//!
//! # Usage
//!
//! ```bash
//! CATALOG_DB_URL=postgres://localhost/catalog cargo run --bin catalog-probe
//! ```
//!
//! # Environment Variables
//!
//! * `CATALOG_DB_URL` - PostgreSQL connection string
//! * `CATALOG_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! * `CATALOG_DB_ACQUIRE_TIMEOUT_SECS` - Pool acquire timeout (default: 30)
//! * `RUST_LOG` - Log filter (default: info)

use anyhow::{bail, Context};
use domain_catalog::{schema, Fuel};
use infra_db::{DatabaseConfig, DbContext, PgStore, Repository, COMMIT_FAILED};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DatabaseConfig::from_env().context("invalid CATALOG_DB_* configuration")?;
    tracing::info!(max_connections = config.max_connections, "Starting catalog probe");

    let store = PgStore::connect(&config).await?;
    store.ensure_schema(&schema()).await?;

    let context = DbContext::new(store);
    let fuels = Repository::<Fuel>::new(context.clone());

    let probe_name = format!("probe-{}", std::process::id());
    let fuel = fuels.insert_async(Fuel::new(probe_name)).await?;
    if !fuel.id.is_assigned() {
        let diagnostic = context
            .take_last_failure()
            .map(|failure| failure.to_string())
            .unwrap_or_default();
        bail!("insert was rejected: {diagnostic}");
    }

    let stored = fuels
        .get_by_id_async(fuel.id)
        .await?
        .context("inserted fuel could not be read back")?;
    tracing::info!(fuel = %serde_json::to_string(&stored)?, "read back");

    if fuels.delete_async(stored).await? == COMMIT_FAILED {
        bail!("cleanup failed: {:?}", context.take_last_failure());
    }

    tracing::info!("Catalog probe succeeded");
    Ok(())
}

/// Initializes the tracing subscriber, honouring `RUST_LOG`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
