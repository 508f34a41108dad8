//! Per-contract indexing state.
//!
//! The persisted cursor that lets polling resume after a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Lt, TxId};

/// Durable indexing state of one contract address.
///
/// `last_processed_lt` is the `lt` of the most recently persisted
/// transaction, or the bootstrap value before the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerState {
    /// Indexed account, unique.
    pub contract_address: String,

    /// Cursor position.
    pub last_processed_lt: Lt,

    /// Hash of the transaction at the cursor, empty after bootstrap from
    /// zero or a rewind.
    pub last_processed_hash: String,

    /// When the cursor last moved.
    pub last_processed_time: Option<DateTime<Utc>>,

    /// Whether a polling loop is running for this address.
    pub is_running: bool,
}

impl IndexerState {
    /// Creates state at the zero cursor.
    #[must_use]
    pub fn new(contract_address: impl Into<String>) -> Self {
        Self {
            contract_address: contract_address.into(),
            last_processed_lt: Lt::ZERO,
            last_processed_hash: String::new(),
            last_processed_time: None,
            is_running: false,
        }
    }

    /// Creates state positioned at the account's current tip.
    ///
    /// Falls back to the zero cursor when the tip is unknown.
    #[must_use]
    pub fn bootstrap(contract_address: impl Into<String>, tip: Option<TxId>) -> Self {
        let mut state = Self::new(contract_address);
        if let Some(tip) = tip {
            state.last_processed_lt = tip.lt;
            state.last_processed_hash = tip.hash;
        }
        state.last_processed_time = Some(Utc::now());
        state
    }

    /// Applies a cursor update.
    pub fn apply(&mut self, update: &CursorUpdate) {
        self.last_processed_lt = update.lt;
        self.last_processed_hash.clone_from(&update.hash);
        self.last_processed_time = Some(update.time);
    }

    /// Rewinds the cursor to `lt`, clearing the hash.
    pub fn rewind(&mut self, lt: Lt) {
        self.last_processed_lt = lt;
        self.last_processed_hash.clear();
        self.last_processed_time = Some(Utc::now());
    }
}

/// A move of the cursor to a processed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorUpdate {
    /// Indexed account.
    pub contract_address: String,
    /// New cursor position.
    pub lt: Lt,
    /// Hash of the transaction at the new position.
    pub hash: String,
    /// When the move happened.
    pub time: DateTime<Utc>,
}

impl CursorUpdate {
    /// Creates an update for `id` on `contract_address`, stamped now.
    #[must_use]
    pub fn new(contract_address: impl Into<String>, id: TxId) -> Self {
        Self {
            contract_address: contract_address.into(),
            lt: id.lt,
            hash: id.hash,
            time: Utc::now(),
        }
    }
}
