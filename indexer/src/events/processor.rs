//! Transaction processor implementation.
//!
//! Deduplicates, classifies and persists transactions, then drives their
//! side effects and advances the cursor.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::classifier::classify;
use super::parser::parse_event;
use super::types::{IndexedTransaction, ParsedEvent, ProcessOutcome};
use crate::cursor::CursorUpdate;
use crate::dispatcher::SideEffectDispatcher;
use crate::metrics::IndexerMetrics;
use crate::store::{IndexStore, StoreError};
use crate::types::Transaction;

/// Processor for transactions of one contract.
///
/// Transactions must be fed oldest-first. Each call either records a new
/// row and moves the cursor past it, or recognises the hash as already
/// stored and only moves the cursor.
///
/// # Example
///
/// ```rust,ignore
/// use coinnovac_indexer::events::TransactionProcessor;
///
/// let processor = TransactionProcessor::new(address, store, dispatcher, metrics);
/// for tx in &batch {
///     let outcome = processor.process(tx).await?;
///     println!("{} -> {:?}", tx.hash, outcome);
/// }
/// ```
pub struct TransactionProcessor {
    /// Indexed account.
    contract_address: String,

    /// Persistent state.
    store: Arc<dyn IndexStore>,

    /// Side effects of newly seen events.
    dispatcher: SideEffectDispatcher,

    /// Metrics for monitoring.
    metrics: Arc<IndexerMetrics>,
}

impl TransactionProcessor {
    /// Creates a new processor.
    #[must_use]
    pub fn new(
        contract_address: impl Into<String>,
        store: Arc<dyn IndexStore>,
        dispatcher: SideEffectDispatcher,
        metrics: Arc<IndexerMetrics>,
    ) -> Self {
        Self {
            contract_address: contract_address.into(),
            store,
            dispatcher,
            metrics,
        }
    }

    /// Returns a reference to the metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<IndexerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Processes one transaction.
    ///
    /// A failed side effect does not fail the call: the row stays
    /// unprocessed and the cursor still moves past it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails. The cursor then still points
    /// before `tx` and the next cycle retries it.
    pub async fn process(&self, tx: &Transaction) -> Result<ProcessOutcome, StoreError> {
        let start = Instant::now();
        let update = CursorUpdate::new(&self.contract_address, tx.id());

        if let Some(existing) = self.store.find_transaction(&tx.hash).await? {
            if existing.processed {
                debug!(hash = %tx.hash, lt = %tx.lt, "Transaction already indexed");
            } else {
                warn!(
                    hash = %tx.hash,
                    lt = %tx.lt,
                    "Transaction already indexed with pending side effects, not re-dispatching"
                );
            }
            return self.skip_duplicate(&update).await;
        }

        let event_type = classify(tx);
        let parsed_data = match parse_event(tx, event_type) {
            // Unknown events carry no payload.
            Ok(ParsedEvent::Unknown) => None,
            Ok(event) => Some(event),
            Err(e) => {
                warn!(hash = %tx.hash, %event_type, error = %e, "Failed to parse event payload");
                self.metrics.record_parse_failure();
                None
            }
        };

        let row = IndexedTransaction::new(tx, &self.contract_address, event_type, parsed_data);
        if !self.store.insert_transaction(&row).await? {
            // Another writer stored the hash between lookup and insert.
            return self.skip_duplicate(&update).await;
        }

        info!(hash = %tx.hash, lt = %tx.lt, %event_type, "Indexed transaction");

        match self.dispatcher.dispatch(row.parsed_data.as_ref()).await {
            Ok(outcome) => {
                debug!(hash = %tx.hash, ?outcome, "Side effects applied");
                self.store.complete_transaction(&tx.hash, &update).await?;
                self.metrics.record_indexed(event_type, start.elapsed());
                Ok(ProcessOutcome::Indexed { event_type })
            }
            Err(e) => {
                error!(
                    hash = %tx.hash,
                    lt = %tx.lt,
                    error = %e,
                    "Side effects failed, row left unprocessed"
                );
                self.metrics.record_dispatch_failure();
                self.store.advance_cursor(&update).await?;
                Ok(ProcessOutcome::DispatchFailed { event_type })
            }
        }
    }

    async fn skip_duplicate(&self, update: &CursorUpdate) -> Result<ProcessOutcome, StoreError> {
        self.metrics.record_duplicate();
        self.store.advance_cursor(update).await?;
        Ok(ProcessOutcome::Duplicate)
    }
}

impl std::fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("contract_address", &self.contract_address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::campaigns::{Campaign, CampaignDirectory, CampaignError, InMemoryCampaignDirectory};
    use crate::events::EventType;
    use crate::store::MemoryStore;
    use crate::testing;
    use crate::types::Lt;

    const ADDRESS: &str = "EQfactory";

    struct FailingDirectory;

    #[async_trait]
    impl CampaignDirectory for FailingDirectory {
        async fn attach_to_latest_pending(
            &self,
            _creator: &str,
            _contract_address: &str,
        ) -> Result<Option<String>, CampaignError> {
            Err(CampaignError::Unavailable("offline".to_string()))
        }
    }

    fn tx(raw: &crate::rpc::RawTransaction) -> Transaction {
        Transaction::from_raw(raw, ADDRESS).expect("normalize")
    }

    fn processor(
        store: &Arc<MemoryStore>,
        campaigns: Arc<dyn CampaignDirectory>,
    ) -> TransactionProcessor {
        TransactionProcessor::new(
            ADDRESS,
            Arc::clone(store) as Arc<dyn IndexStore>,
            SideEffectDispatcher::new(campaigns),
            Arc::new(IndexerMetrics::new()),
        )
    }

    async fn cursor(store: &MemoryStore) -> Lt {
        store
            .load_state(ADDRESS)
            .await
            .expect("load")
            .map_or(Lt::ZERO, |s| s.last_processed_lt)
    }

    #[tokio::test]
    async fn test_process_creation_attaches_campaign() {
        let store = Arc::new(MemoryStore::new());
        let campaigns = InMemoryCampaignDirectory::new();
        campaigns
            .insert(Campaign::pending("c1", "EQcreator", Utc::now()))
            .await;
        let processor = processor(&store, Arc::new(campaigns.clone()));

        let outcome = processor
            .process(&tx(&testing::creation(100, "EQcreator", "EQjetton")))
            .await
            .expect("process");

        assert_eq!(
            outcome,
            ProcessOutcome::Indexed {
                event_type: EventType::Creation
            }
        );
        let row = store
            .find_transaction(&testing::hash_for(100))
            .await
            .expect("find")
            .expect("row");
        assert!(row.processed);
        assert!(matches!(row.parsed_data, Some(ParsedEvent::Creation(_))));
        assert_eq!(cursor(&store).await, Lt::new(100));
        assert_eq!(
            campaigns.get("c1").await.expect("campaign").token_address.as_deref(),
            Some("EQjetton")
        );
    }

    #[tokio::test]
    async fn test_process_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(&store, Arc::new(InMemoryCampaignDirectory::new()));
        let request = tx(&testing::request(100, "EQbuyer"));

        let first = processor.process(&request).await.expect("first");
        let second = processor.process(&request).await.expect("second");

        assert!(first.is_new());
        assert_eq!(second, ProcessOutcome::Duplicate);
        assert_eq!(store.transactions().await.len(), 1);
        assert_eq!(processor.metrics().duplicates_skipped(), 1);
        assert_eq!(processor.metrics().transactions_indexed(), 1);
    }

    #[tokio::test]
    async fn test_process_dispatch_failure_leaves_row_unprocessed() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(&store, Arc::new(FailingDirectory));

        let outcome = processor
            .process(&tx(&testing::creation(100, "EQcreator", "EQjetton")))
            .await
            .expect("process");

        assert_eq!(
            outcome,
            ProcessOutcome::DispatchFailed {
                event_type: EventType::Creation
            }
        );
        let row = store
            .find_transaction(&testing::hash_for(100))
            .await
            .expect("find")
            .expect("row");
        assert!(!row.processed);
        assert_eq!(cursor(&store).await, Lt::new(100));
        assert_eq!(processor.metrics().dispatch_failures(), 1);
    }

    #[tokio::test]
    async fn test_process_unprocessed_duplicate_is_not_redispatched() {
        let store = Arc::new(MemoryStore::new());
        let failing = processor(&store, Arc::new(FailingDirectory));
        let creation = tx(&testing::creation(100, "EQcreator", "EQjetton"));
        failing.process(&creation).await.expect("first");

        let campaigns = InMemoryCampaignDirectory::new();
        campaigns
            .insert(Campaign::pending("c1", "EQcreator", Utc::now()))
            .await;
        let healthy = processor(&store, Arc::new(campaigns.clone()));

        let outcome = healthy.process(&creation).await.expect("replay");
        assert_eq!(outcome, ProcessOutcome::Duplicate);
        assert!(campaigns.get("c1").await.expect("campaign").token_address.is_none());
    }

    #[tokio::test]
    async fn test_process_parse_failure_stores_row_without_payload() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(&store, Arc::new(FailingDirectory));

        // Outbound message without destination: classified as creation but
        // no emitted address can be extracted.
        let mut raw = testing::creation(100, "EQcreator", "");
        if let Some(out) = raw.out_msgs.first_mut() {
            out.destination = None;
        }

        let outcome = processor.process(&tx(&raw)).await.expect("process");
        assert_eq!(
            outcome,
            ProcessOutcome::Indexed {
                event_type: EventType::Creation
            }
        );

        let row = store
            .find_transaction(&testing::hash_for(100))
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.event_type, EventType::Creation);
        assert!(row.parsed_data.is_none());
        assert!(row.processed);
        assert_eq!(processor.metrics().parse_failures(), 1);
    }

    #[tokio::test]
    async fn test_process_unknown_event() {
        let store = Arc::new(MemoryStore::new());
        let processor = processor(&store, Arc::new(FailingDirectory));

        let outcome = processor
            .process(&tx(&testing::unknown(7)))
            .await
            .expect("process");
        assert_eq!(
            outcome,
            ProcessOutcome::Indexed {
                event_type: EventType::Unknown
            }
        );
        assert_eq!(cursor(&store).await, Lt::new(7));

        let row = store
            .find_transaction(&testing::hash_for(7))
            .await
            .expect("find")
            .expect("row");
        assert_eq!(row.event_type, EventType::Unknown);
        assert!(row.parsed_data.is_none());
        assert!(row.processed);
        assert_eq!(processor.metrics().parse_failures(), 0);
    }
}
