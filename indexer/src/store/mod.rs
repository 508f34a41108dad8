//! Persistent store for indexer state and indexed transactions.
//!
//! [`IndexStore`] is the seam the indexer writes through. [`PgStore`] is the
//! production backend; [`MemoryStore`] backs tests and local dry runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::cursor::{CursorUpdate, IndexerState};
use crate::events::{EventType, IndexedTransaction};
use crate::types::Lt;

/// Default page size for transaction listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Largest page size accepted for transaction listings.
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value does not fit the column type.
    #[error("value out of range for column {0}")]
    OutOfRange(&'static str),

    /// A stored value could not be interpreted.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Durable storage used by the indexer.
///
/// Writes that touch both a transaction row and the cursor are atomic.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Loads the state row for `contract_address`.
    async fn load_state(&self, contract_address: &str)
    -> Result<Option<IndexerState>, StoreError>;

    /// Inserts `state` unless a row for its address exists, then returns the
    /// stored row.
    async fn insert_state_if_absent(&self, state: &IndexerState)
    -> Result<IndexerState, StoreError>;

    /// Sets the running flag. No-op when no state row exists.
    async fn set_running(&self, contract_address: &str, running: bool) -> Result<(), StoreError>;

    /// Moves the cursor to `lt` and clears the hash, creating the row if
    /// needed. Transaction rows are left untouched.
    async fn rewind_cursor(&self, contract_address: &str, lt: Lt) -> Result<(), StoreError>;

    /// Moves the cursor without touching any transaction row.
    async fn advance_cursor(&self, update: &CursorUpdate) -> Result<(), StoreError>;

    /// Looks up a transaction row by hash.
    async fn find_transaction(&self, hash: &str)
    -> Result<Option<IndexedTransaction>, StoreError>;

    /// Inserts a transaction row. Returns false if the hash already exists.
    async fn insert_transaction(&self, row: &IndexedTransaction) -> Result<bool, StoreError>;

    /// Marks the row processed and moves the cursor in one atomic write.
    async fn complete_transaction(
        &self,
        hash: &str,
        update: &CursorUpdate,
    ) -> Result<(), StoreError>;

    /// Counts rows of `contract_address`, optionally by processed flag.
    async fn count_transactions(
        &self,
        contract_address: &str,
        processed: Option<bool>,
    ) -> Result<u64, StoreError>;

    /// Lists rows matching `query`, newest `lt` first.
    async fn list_transactions(&self, query: &TransactionQuery)
    -> Result<TransactionPage, StoreError>;
}

/// Filter and pagination for transaction listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Restrict to one contract.
    pub contract_address: Option<String>,
    /// Restrict to one event type.
    pub event_type: Option<EventType>,
    /// Restrict by processed flag.
    pub processed: Option<bool>,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            contract_address: None,
            event_type: None,
            processed: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl TransactionQuery {
    /// Clamps page to at least 1 and limit to `1..=MAX_PAGE_LIMIT`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    /// Returns the number of rows to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }

    /// Returns true if `row` passes the filters.
    #[must_use]
    pub fn matches(&self, row: &IndexedTransaction) -> bool {
        self.contract_address
            .as_ref()
            .is_none_or(|address| *address == row.contract_address)
            && self.event_type.is_none_or(|t| t == row.event_type)
            && self.processed.is_none_or(|p| p == row.processed)
    }
}

/// One page of a transaction listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    /// Rows of this page.
    pub transactions: Vec<IndexedTransaction>,
    /// Rows matching the filters across all pages.
    pub total: u64,
}
