//! Coinnovac Indexer - Resumable transaction indexer for the campaign factory.
//!
//! This crate polls a TonCenter-compatible RPC endpoint for the transaction
//! history of one contract account, persists every transaction exactly once,
//! classifies it, and drives the campaign side effects it implies. Progress is
//! tracked by a durable logical-time cursor, so the indexer resumes where it
//! left off after a restart.
//!
//! # Components
//!
//! - [`config`]: Indexer configuration
//! - [`rpc`]: RPC provider seam and the TonCenter client
//! - [`fetcher`]: Retrying, paginating transaction fetcher
//! - [`events`]: Classification, parsing and the transaction processor
//! - [`dispatcher`]: Side effects of classified events
//! - [`campaigns`]: Campaign-state collaborator
//! - [`store`]: Persistent state (PostgreSQL and in-memory)
//! - [`service`]: Polling loop and operator controls
//! - [`metrics`]: Indexer metrics

pub mod campaigns;
pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod metrics;
pub mod rpc;
pub mod service;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use campaigns::{CampaignDirectory, InMemoryCampaignDirectory, PgCampaignDirectory};
pub use config::{ConfigError, IndexerConfig};
pub use cursor::{CursorUpdate, IndexerState};
pub use dispatcher::{DispatchError, DispatchOutcome, SideEffectDispatcher};
pub use error::{ControlError, IndexerError, ParseError};
pub use events::{EventType, IndexedTransaction, ParsedEvent, TransactionProcessor};
pub use fetcher::{RetryPolicy, TransactionFetcher};
pub use metrics::{IndexerMetrics, MetricsSnapshot};
pub use rpc::{RpcClientConfig, RpcError, TonCenterClient, TransactionSource};
pub use service::{IndexerService, IndexerStatus, IterationSummary};
pub use store::{IndexStore, MemoryStore, PgStore, StoreError, TransactionPage, TransactionQuery};
pub use types::{Lt, Transaction, TxId};
