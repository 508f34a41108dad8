//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{IndexStore, StoreError, TransactionPage, TransactionQuery};
use crate::cursor::{CursorUpdate, IndexerState};
use crate::events::IndexedTransaction;
use crate::types::Lt;

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<String, IndexerState>,
    transactions: HashMap<String, IndexedTransaction>,
}

/// A process-local [`IndexStore`].
///
/// Each method holds a single write lock, so combined writes are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all transaction rows ordered by `lt` ascending.
    pub async fn transactions(&self) -> Vec<IndexedTransaction> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner.transactions.values().cloned().collect();
        rows.sort_by_key(|row| row.lt);
        rows
    }

    /// Returns the number of state rows.
    pub async fn state_count(&self) -> usize {
        self.inner.read().await.states.len()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn load_state(
        &self,
        contract_address: &str,
    ) -> Result<Option<IndexerState>, StoreError> {
        Ok(self.inner.read().await.states.get(contract_address).cloned())
    }

    async fn insert_state_if_absent(
        &self,
        state: &IndexerState,
    ) -> Result<IndexerState, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .states
            .entry(state.contract_address.clone())
            .or_insert_with(|| state.clone());
        Ok(stored.clone())
    }

    async fn set_running(&self, contract_address: &str, running: bool) -> Result<(), StoreError> {
        if let Some(state) = self.inner.write().await.states.get_mut(contract_address) {
            state.is_running = running;
        }
        Ok(())
    }

    async fn rewind_cursor(&self, contract_address: &str, lt: Lt) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .states
            .entry(contract_address.to_string())
            .or_insert_with(|| IndexerState::new(contract_address))
            .rewind(lt);
        Ok(())
    }

    async fn advance_cursor(&self, update: &CursorUpdate) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .states
            .entry(update.contract_address.clone())
            .or_insert_with(|| IndexerState::new(update.contract_address.clone()))
            .apply(update);
        Ok(())
    }

    async fn find_transaction(
        &self,
        hash: &str,
    ) -> Result<Option<IndexedTransaction>, StoreError> {
        Ok(self.inner.read().await.transactions.get(hash).cloned())
    }

    async fn insert_transaction(&self, row: &IndexedTransaction) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.transactions.contains_key(&row.hash) {
            return Ok(false);
        }
        inner.transactions.insert(row.hash.clone(), row.clone());
        Ok(true)
    }

    async fn complete_transaction(
        &self,
        hash: &str,
        update: &CursorUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(row) = inner.transactions.get_mut(hash) {
            row.processed = true;
        }
        inner
            .states
            .entry(update.contract_address.clone())
            .or_insert_with(|| IndexerState::new(update.contract_address.clone()))
            .apply(update);
        Ok(())
    }

    async fn count_transactions(
        &self,
        contract_address: &str,
        processed: Option<bool>,
    ) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        let count = inner
            .transactions
            .values()
            .filter(|row| row.contract_address == contract_address)
            .filter(|row| processed.is_none_or(|p| p == row.processed))
            .count();
        Ok(count as u64)
    }

    async fn list_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .transactions
            .values()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.lt.cmp(&a.lt).then_with(|| b.created_at.cmp(&a.created_at)));

        let total = rows.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let transactions = rows
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect();

        Ok(TransactionPage {
            transactions,
            total,
        })
    }
}
