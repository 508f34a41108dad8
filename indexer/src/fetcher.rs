//! Transaction fetching with bounded retry.
//!
//! Turns the provider's newest-first pages into the oldest-first sequence
//! the processor consumes. Provider failures never escape: after the
//! configured attempts the fetcher reports "no data" for the cycle.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::IndexerMetrics;
use crate::rpc::{RawTransaction, RpcError, TransactionSource, TransactionsRequest};
use crate::types::{Lt, Transaction, TxId};

/// Fixed-delay retry policy for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up, at least 1.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

/// Fetches and normalizes the history of one account.
#[derive(Clone)]
pub struct TransactionFetcher {
    source: Arc<dyn TransactionSource>,
    retry: RetryPolicy,
    batch_size: u32,
    metrics: Arc<IndexerMetrics>,
}

impl TransactionFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(
        source: Arc<dyn TransactionSource>,
        retry: RetryPolicy,
        batch_size: u32,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            source,
            retry,
            batch_size: batch_size.max(1),
            metrics,
        }
    }

    /// Returns one page of at most `limit` transactions newer than `to_lt`,
    /// starting at `before` or the account tip, ordered oldest-first.
    ///
    /// Returns `None` when every attempt failed or `cancel` fired.
    pub async fn fetch_page(
        &self,
        address: &str,
        to_lt: Lt,
        limit: u32,
        before: Option<&TxId>,
        cancel: &CancellationToken,
    ) -> Option<Vec<Transaction>> {
        let raw = self
            .fetch_raw_page(address, to_lt, limit, before, cancel)
            .await?;
        let mut page = self.normalize(address, &raw);
        page.reverse();
        Some(page)
    }

    /// Returns every transaction newer than `cursor`, oldest-first and free
    /// of duplicate hashes.
    ///
    /// Walks backward page by page from the tip until it reaches the cursor.
    /// Any page that cannot be fetched voids the whole cycle, so a partial
    /// walk never leaves a gap behind the cursor.
    ///
    /// A follow-up page starts at the previous page's oldest transaction,
    /// which the provider returns again, so it asks for one extra row.
    pub async fn fetch_since(
        &self,
        address: &str,
        cursor: Lt,
        cancel: &CancellationToken,
    ) -> Option<Vec<Transaction>> {
        let mut collected = Vec::new();
        let mut seen = HashSet::new();
        let mut before: Option<TxId> = None;
        let mut pages = 0u32;

        loop {
            let limit = if before.is_some() {
                self.batch_size.saturating_add(1)
            } else {
                self.batch_size
            };
            let raw = self
                .fetch_raw_page(address, cursor, limit, before.as_ref(), cancel)
                .await?;
            pages += 1;

            let full_page = raw.len() >= limit as usize;
            let page = self.normalize(address, &raw);
            let oldest = page.last().map(Transaction::id);

            let mut added = 0usize;
            for tx in page {
                if tx.lt > cursor && seen.insert(tx.hash.clone()) {
                    collected.push(tx);
                    added += 1;
                }
            }

            if !full_page || added == 0 {
                break;
            }
            match oldest {
                Some(id) if id.lt > cursor => before = Some(id),
                _ => break,
            }
        }

        collected.sort_by_key(|tx| tx.lt);
        debug!(
            address,
            cursor = %cursor,
            pages,
            count = collected.len(),
            "Fetched transactions since cursor"
        );
        Some(collected)
    }

    /// Returns the most recent transaction of `address`.
    ///
    /// `None` if the account has no history, the provider kept failing, or
    /// `cancel` fired.
    pub async fn account_tip(&self, address: &str, cancel: &CancellationToken) -> Option<TxId> {
        self.with_retry("getAddressInformation", cancel, || {
            self.source.get_account_state(address)
        })
        .await
        .flatten()
        .and_then(|state| state.last_transaction)
    }

    async fn fetch_raw_page(
        &self,
        address: &str,
        to_lt: Lt,
        limit: u32,
        before: Option<&TxId>,
        cancel: &CancellationToken,
    ) -> Option<Vec<RawTransaction>> {
        let request = TransactionsRequest {
            address: address.to_string(),
            limit,
            before: before.cloned(),
            to_lt,
        };

        self.with_retry("getTransactions", cancel, || {
            self.source.get_transactions(&request)
        })
        .await
    }

    /// Newest-first normalization; malformed entries are dropped.
    fn normalize(&self, address: &str, raw: &[RawTransaction]) -> Vec<Transaction> {
        raw.iter()
            .filter_map(|tx| match Transaction::from_raw(tx, address) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    warn!(address, error = %e, "Skipping malformed transaction");
                    self.metrics.record_parse_failure();
                    None
                }
            })
            .collect()
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                result = call() => result,
            };

            match result {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!(operation, attempt, max_attempts, error = %e, "RPC call failed");
                    if !e.is_retryable() || attempt == max_attempts {
                        break;
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(self.retry.delay) => {}
            }
        }

        warn!(operation, "RPC retries exhausted, no data this cycle");
        self.metrics.record_fetch_failure();
        None
    }
}

impl std::fmt::Debug for TransactionFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionFetcher")
            .field("retry", &self.retry)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
