//! Coinnovac admin API binary.
//!
//! Serves the indexer control surface and optionally starts the indexer.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use coinnovac_api::{AppState, Server, ServerConfig};
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
                .unwrap_or_else(|_| "info,coinnovac_api=debug,coinnovac_indexer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("API_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .context("API_PORT must be a valid port number")?;
    let autostart = env::var("INDEXER_AUTOSTART")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let indexer_config = IndexerConfig::from_env().context("invalid indexer configuration")?;

    let client = TonCenterClient::new(indexer_config.rpc_client_config())
        .context("failed to build RPC client")?;

    let (store, campaigns): (Arc<dyn IndexStore>, Arc<dyn CampaignDirectory>) =
        match env::var("DATABASE_URL") {
            Ok(url) => {
                let store = PgStore::connect(&url, 10)
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

    let indexer = Arc::new(IndexerService::new(
        indexer_config,
        Arc::new(client),
        store,
        campaigns,
    )?);

    if autostart {
        indexer.start().await?;
    }

    let config = ServerConfig::new(host, port);
    let state = AppState::new(indexer);

    tracing::info!(
        "Starting Coinnovac admin API on {}:{}",
        config.host,
        config.port
    );

    let server = Server::new(config, state);
    server.run().await?;

    Ok(())
}
