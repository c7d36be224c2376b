//! KCIDB spool ingester.
//!
//! Usage:
//!     POSTGRES_PASSWORD=... STORAGE_TOKEN=... kcidb-ingester --spool-dir /spool

use anyhow::Context;
use clap::Parser;
use kcidb_ingester::{
    Args, BlobStore, HttpBlobStore, Ingester, IngesterConfig, SpoolDirs, TreeNameMap,
};
use kcidb_logging::{init_logging, LogConfig};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(LogConfig {
        app_name: "kcidb-ingester",
        verbose: args.verbose,
        log_dir: args.log_dir.clone(),
    })?;

    let config = IngesterConfig::from_env(args)?;
    info!(?config, "Starting KCIDB ingester");

    let spool = SpoolDirs::verify(&config.spool_dir)?;
    let trees = TreeNameMap::load(&config.trees_file)?;
    let store = kcidb_store::connect(&config.store_url, config.db_password.as_deref())
        .await
        .with_context(|| format!("Failed to connect to {}", config.store_url))?;

    let blob_store = match &config.storage {
        Some(storage) => {
            let client = HttpBlobStore::new(&storage.base_url, &storage.token)
                .context("Failed to build storage client")?;
            Some(Arc::new(client) as Arc<dyn BlobStore>)
        }
        None => None,
    };

    let ingester = Ingester::new(spool, trees, store)
        .with_blob_store(blob_store)
        .with_poll_interval(config.poll_interval);

    let totals = ingester
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!(
        archived = totals.archived,
        failed = totals.failed,
        deleted = totals.deleted,
        "Ingester stopped"
    );
    Ok(())
}
