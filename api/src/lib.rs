//! Coinnovac admin API.
//!
//! HTTP control surface for the transaction indexer: start, stop, reindex,
//! status, metrics and read access to indexed transactions.
//!
//! # Components
//!
//! - **Routes**: Handlers under `/admin/indexer`
//! - **Error**: JSON error rendering with status mapping
//! - **Server**: Listener, middleware and graceful shutdown

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::{router, ADMIN_PREFIX};
pub use server::{Server, ServerConfig, ServerError};
pub use state::AppState;
