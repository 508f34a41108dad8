//! Blockchain RPC access.
//!
//! [`TransactionSource`] is the seam between the indexer and the provider;
//! [`TonCenterClient`] implements it over the TonCenter v2 HTTP API.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::{RpcClientConfig, TonCenterClient};
pub use error::RpcError;
pub use types::{AccountState, RawTransaction, TransactionsRequest};

/// Read access to an account's transaction history.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Returns one page of transactions, newest-first.
    ///
    /// The page starts at `request.before` (inclusive) or at the account tip,
    /// and never reaches below `request.to_lt`.
    async fn get_transactions(
        &self,
        request: &TransactionsRequest,
    ) -> Result<Vec<RawTransaction>, RpcError>;

    /// Returns the current state of an account, `None` if it is unknown.
    async fn get_account_state(&self, address: &str) -> Result<Option<AccountState>, RpcError>;
}
