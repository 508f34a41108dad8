//! Coinnovac Indexer binary.
//!
//! Runs the polling loop for the configured factory contract until Ctrl-C.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use coinnovac_indexer::{
    CampaignDirectory, IndexStore, IndexerConfig, IndexerService, InMemoryCampaignDirectory,
    MemoryStore, PgCampaignDirectory, PgStore, TonCenterClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coinnovac_indexer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = IndexerConfig::from_env().context("invalid indexer configuration")?;

    tracing::info!("Starting Coinnovac Indexer");
    tracing::info!("Contract: {}", config.contract_address);
    tracing::info!("RPC endpoint: {}", config.rpc_endpoint);

    let client = TonCenterClient::new(config.rpc_client_config())
        .context("failed to build RPC client")?;

    let (store, campaigns): (Arc<dyn IndexStore>, Arc<dyn CampaignDirectory>) =
        match env::var("DATABASE_URL") {
            Ok(url) => {
                let store = PgStore::connect(&url, 5)
                    .await
                    .context("failed to connect to database")?;
                store.migrate().await.context("failed to run migrations")?;
                let campaigns = PgCampaignDirectory::new(store.pool().clone());
                (Arc::new(store), Arc::new(campaigns))
            }
            Err(_) => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                (
                    Arc::new(MemoryStore::new()),
                    Arc::new(InMemoryCampaignDirectory::new()),
                )
            }
        };

    let service = IndexerService::new(config, Arc::new(client), store, campaigns)?;
    service.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down indexer");
    service.stop().await?;

    let snapshot = service.metrics().snapshot();
    tracing::info!(
        indexed = snapshot.transactions_indexed,
        duplicates = snapshot.duplicates_skipped,
        iteration_errors = snapshot.iteration_errors,
        "Final metrics"
    );

    Ok(())
}
