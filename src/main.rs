//! jrmart order service
//!
//! Reads `jrmart.yaml` (or `$JRMART_CONFIG`), applies `JRMART_*` overrides
//! and serves the order API until SIGINT or SIGTERM.

use anyhow::Result;
use jrmart::config::MartConfig;
use jrmart::server::ServerBuilder;
use jrmart::storage::StorageBackends;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = MartConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        backend = ?config.storage.backend,
        uploads = %config.uploads.directory.display(),
        "starting jrmart v{}",
        env!("CARGO_PKG_VERSION")
    );

    let backends = StorageBackends::from_config(&config).await?;
    let addr = config.server.bind_addr();

    ServerBuilder::new()
        .with_config(config)
        .with_backends(backends)
        .serve(&addr)
        .await
}
