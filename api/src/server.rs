//! HTTP server wiring.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::Router;
use coinnovac_indexer::IndexerService;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::routes;
use crate::state::AppState;

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address is invalid.
    #[error("invalid listen address {0}")]
    InvalidAddress(String),

    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listen address of the admin server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host or IP to bind.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServerConfig {
    /// Creates a config for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses the listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ServerError::InvalidAddress(addr))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("0.0.0.0", 8080)
    }
}

/// Admin HTTP server around one indexer.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Creates a server.
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Builds the full application with middleware.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
            .allow_origin(Any);

        routes::router(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
    }

    /// Serves until Ctrl-C.
    ///
    /// On shutdown the indexer is stopped before in-flight requests drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.socket_addr()?;
        let app = self.router();
        let indexer = Arc::clone(&self.state.indexer);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "Admin API listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(indexer))
            .await?;

        info!("Admin API stopped");
        Ok(())
    }
}

async fn shutdown_signal(indexer: Arc<IndexerService>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    info!("Shutdown signal received, stopping indexer");
    if let Err(e) = indexer.stop().await {
        error!(error = %e, "Failed to stop indexer");
    }
}
