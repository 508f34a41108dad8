//! Test doubles for the indexer.
//!
//! [`ChainStub`] serves a scripted account history through
//! [`TransactionSource`], with pagination and injectable failures.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::rpc::types::{RawMessage, RawTransactionId};
use crate::rpc::{AccountState, RawTransaction, RpcError, TransactionSource, TransactionsRequest};
use crate::types::{Lt, TxId};

/// Value attached to generated inbound messages, in nanotons.
pub const DEFAULT_VALUE: &str = "1000000000";

/// Scripted [`TransactionSource`] for one account.
#[derive(Debug, Default)]
pub struct ChainStub {
    history: Mutex<Vec<RawTransaction>>,
    successes_before_failure: AtomicU32,
    failures_remaining: AtomicU32,
    calls: AtomicU32,
}

impl ChainStub {
    /// Creates a stub with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stub serving `history` in any order.
    #[must_use]
    pub fn with_history(history: Vec<RawTransaction>) -> Self {
        let stub = Self::new();
        stub.extend(history);
        stub
    }

    /// Appends transactions to the history.
    pub fn extend(&self, transactions: impl IntoIterator<Item = RawTransaction>) {
        self.history().extend(transactions);
    }

    /// Makes the next `count` calls fail with a provider error.
    pub fn fail_next(&self, count: u32) {
        self.fail_after(0, count);
    }

    /// Lets `successes` calls through, then fails the following `count`.
    pub fn fail_after(&self, successes: u32, count: u32) {
        self.successes_before_failure
            .store(successes, Ordering::SeqCst);
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Returns how many calls were made, failed ones included.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn history(&self) -> MutexGuard<'_, Vec<RawTransaction>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_failure(&self) -> Result<(), RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures_remaining.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }
        let passed = self
            .successes_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if passed {
            return Ok(());
        }
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RpcError::Status {
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn raw_lt(tx: &RawTransaction) -> Lt {
    tx.transaction_id
        .as_ref()
        .and_then(|id| id.lt.as_deref())
        .and_then(|lt| lt.parse().ok())
        .unwrap_or(Lt::ZERO)
}

#[async_trait]
impl TransactionSource for ChainStub {
    async fn get_transactions(
        &self,
        request: &TransactionsRequest,
    ) -> Result<Vec<RawTransaction>, RpcError> {
        self.take_failure()?;

        let mut page: Vec<RawTransaction> = self
            .history()
            .iter()
            .filter(|tx| {
                let lt = raw_lt(tx);
                lt > request.to_lt && request.before.as_ref().is_none_or(|b| lt <= b.lt)
            })
            .cloned()
            .collect();
        page.sort_by_key(|tx| std::cmp::Reverse(raw_lt(tx)));
        page.truncate(request.limit as usize);
        Ok(page)
    }

    async fn get_account_state(&self, _address: &str) -> Result<Option<AccountState>, RpcError> {
        self.take_failure()?;

        let history = self.history();
        let last_transaction = history.iter().max_by_key(|tx| raw_lt(tx)).map(|tx| TxId {
            lt: raw_lt(tx),
            hash: tx
                .transaction_id
                .as_ref()
                .and_then(|id| id.hash.clone())
                .unwrap_or_default(),
        });

        Ok(Some(AccountState {
            balance: "0".to_string(),
            last_transaction,
        }))
    }
}

/// Hash used by the builders for a transaction at `lt`.
#[must_use]
pub fn hash_for(lt: u64) -> String {
    format!("tx-{lt}")
}

fn raw(lt: u64, in_msg: Option<RawMessage>, out_msgs: Vec<RawMessage>) -> RawTransaction {
    RawTransaction {
        transaction_id: Some(RawTransactionId {
            lt: Some(lt.to_string()),
            hash: Some(hash_for(lt)),
        }),
        utime: Some(1_700_000_000 + i64::try_from(lt).unwrap_or(0)),
        now: None,
        in_msg,
        out_msgs,
    }
}

fn message(source: &str, destination: &str, value: &str) -> RawMessage {
    RawMessage {
        source: Some(source.to_string()),
        destination: Some(destination.to_string()),
        value: Some(value.to_string()),
        body_hash: None,
        message: None,
    }
}

/// A transaction that emitted `emitted` on behalf of `creator`.
#[must_use]
pub fn creation(lt: u64, creator: &str, emitted: &str) -> RawTransaction {
    raw(
        lt,
        Some(message(creator, "", DEFAULT_VALUE)),
        vec![message("", emitted, "50000000")],
    )
}

/// A value transfer from `sender` with no outbound messages.
#[must_use]
pub fn request(lt: u64, sender: &str) -> RawTransaction {
    raw(lt, Some(message(sender, "", DEFAULT_VALUE)), Vec::new())
}

/// A transaction with neither outbound messages nor an inbound value.
#[must_use]
pub fn unknown(lt: u64) -> RawTransaction {
    raw(lt, None, Vec::new())
}
