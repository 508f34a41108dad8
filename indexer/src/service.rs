//! Main indexer service.
//!
//! Owns the polling loop of one contract: start, stop, reindex and status.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::campaigns::CampaignDirectory;
use crate::config::{ConfigError, IndexerConfig};
use crate::cursor::IndexerState;
use crate::dispatcher::SideEffectDispatcher;
use crate::error::{ControlError, IndexerError};
use crate::events::{IndexedTransaction, ProcessOutcome, TransactionProcessor};
use crate::fetcher::TransactionFetcher;
use crate::metrics::IndexerMetrics;
use crate::rpc::TransactionSource;
use crate::store::{IndexStore, TransactionPage, TransactionQuery};
use crate::types::Lt;

/// Snapshot of an indexer, as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStatus {
    /// Indexed account.
    pub contract_address: String,
    /// Whether this instance's loop is alive. A flag left persisted by a
    /// crashed process does not count.
    pub is_running: bool,
    /// Cursor position, `0` before the first start.
    pub last_processed_lt: Lt,
    /// When the cursor last moved.
    pub last_processed_time: Option<DateTime<Utc>>,
    /// Rows stored for this contract.
    pub total_indexed: u64,
    /// Rows whose side effects have not completed.
    pub pending_processing: u64,
}

/// Counts of one loop iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationSummary {
    /// Transactions returned by the fetcher.
    pub fetched: usize,
    /// New rows whose side effects completed.
    pub indexed: usize,
    /// Transactions whose hash was already stored.
    pub duplicates: usize,
    /// New rows whose side effects failed.
    pub dispatch_failures: usize,
    /// True if the provider gave no data this cycle.
    pub no_data: bool,
}

impl IterationSummary {
    fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Indexed { .. } => self.indexed += 1,
            ProcessOutcome::DispatchFailed { .. } => self.dispatch_failures += 1,
            ProcessOutcome::Duplicate => self.duplicates += 1,
        }
    }
}

/// Fetch-then-process pipeline shared by the service and its loop task.
struct Pipeline {
    contract_address: String,
    fetcher: TransactionFetcher,
    processor: TransactionProcessor,
    metrics: Arc<IndexerMetrics>,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl Pipeline {
    /// Runs one iteration from `cursor`, advancing it past every transaction
    /// that was fully handled.
    async fn iterate(
        &self,
        cursor: &mut Lt,
        cancel: &CancellationToken,
    ) -> Result<IterationSummary, IndexerError> {
        let address = self.contract_address.as_str();
        let mut summary = IterationSummary::default();

        let Some(batch) = self.fetcher.fetch_since(address, *cursor, cancel).await else {
            if !cancel.is_cancelled() {
                info!(address, cursor = %cursor, "No data this cycle");
            }
            summary.no_data = true;
            return Ok(summary);
        };

        if batch.is_empty() {
            debug!(address, cursor = %cursor, "No new transactions");
            return Ok(summary);
        }

        info!(address, count = batch.len(), "Found new transactions");
        summary.fetched = batch.len();

        for tx in &batch {
            if cancel.is_cancelled() {
                debug!(address, cursor = %cursor, "Cancelled mid-batch");
                break;
            }
            let outcome = self.processor.process(tx).await?;
            *cursor = tx.lt;
            summary.record(&outcome);
        }

        Ok(summary)
    }

    /// Polls until `cancel` fires. A failed or panicking iteration is logged
    /// and followed by the error back-off; it never ends the loop.
    async fn run(self: Arc<Self>, mut cursor: Lt, cancel: CancellationToken) {
        let address = self.contract_address.clone();
        info!(address = %address, cursor = %cursor, "Polling loop started");

        while !cancel.is_cancelled() {
            self.metrics.record_poll();

            let result = AssertUnwindSafe(self.iterate(&mut cursor, &cancel))
                .catch_unwind()
                .await;

            let pause = match result {
                Ok(Ok(summary)) if summary.fetched > 0 => {
                    debug!(address = %address, ?summary, "Iteration complete");
                    None
                }
                Ok(Ok(_)) => Some(self.poll_interval),
                Ok(Err(e)) => {
                    error!(address = %address, cursor = %cursor, error = %e, "Indexer iteration failed");
                    self.metrics.record_iteration_error();
                    Some(self.error_backoff)
                }
                Err(_) => {
                    error!(address = %address, cursor = %cursor, "Indexer iteration panicked");
                    self.metrics.record_iteration_error();
                    Some(self.error_backoff)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!(address = %address, cursor = %cursor, "Polling loop stopped");
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Indexer for one contract address.
///
/// At most one polling loop runs per instance. Collaborators are injected,
/// so several isolated instances can share a process.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use coinnovac_indexer::{IndexerConfig, IndexerService, MemoryStore, TonCenterClient};
/// use coinnovac_indexer::campaigns::InMemoryCampaignDirectory;
///
/// let config = IndexerConfig::from_env()?;
/// let client = TonCenterClient::new(config.rpc_client_config())?;
/// let service = IndexerService::new(
///     config,
///     Arc::new(client),
///     Arc::new(MemoryStore::new()),
///     Arc::new(InMemoryCampaignDirectory::new()),
/// )?;
/// service.start().await?;
/// ```
pub struct IndexerService {
    /// Configuration.
    config: IndexerConfig,

    /// Persistent state.
    store: Arc<dyn IndexStore>,

    /// Pipeline shared with the loop task.
    pipeline: Arc<Pipeline>,

    /// Metrics.
    metrics: Arc<IndexerMetrics>,

    /// The running loop, if any.
    worker: Mutex<Option<Worker>>,
}

impl IndexerService {
    /// Creates a new indexer service.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: IndexerConfig,
        source: Arc<dyn TransactionSource>,
        store: Arc<dyn IndexStore>,
        campaigns: Arc<dyn CampaignDirectory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let metrics = Arc::new(IndexerMetrics::new());
        let fetcher = TransactionFetcher::new(
            source,
            config.retry_policy(),
            config.batch_size,
            Arc::clone(&metrics),
        );
        let processor = TransactionProcessor::new(
            config.contract_address.clone(),
            Arc::clone(&store),
            SideEffectDispatcher::new(campaigns),
            Arc::clone(&metrics),
        );

        let pipeline = Arc::new(Pipeline {
            contract_address: config.contract_address.clone(),
            fetcher,
            processor,
            metrics: Arc::clone(&metrics),
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
        });

        Ok(Self {
            config,
            store,
            pipeline,
            metrics,
            worker: Mutex::new(None),
        })
    }

    /// Returns the indexed contract address.
    #[must_use]
    pub fn contract_address(&self) -> &str {
        &self.config.contract_address
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<IndexerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Returns true if this instance has a live polling loop.
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.as_ref().is_some_and(Worker::is_alive)
    }

    /// Starts the polling loop.
    ///
    /// Resumes from the persisted cursor, or bootstraps one at the account
    /// tip (zero if the tip is unknown or `start_from_tip` is off). Calling
    /// this while a loop is running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded or written.
    pub async fn start(&self) -> Result<(), IndexerError> {
        let address = self.contract_address();
        let mut worker = self.worker.lock().await;

        if worker.as_ref().is_some_and(Worker::is_alive) {
            info!(address, "Indexer already running");
            return Ok(());
        }

        let state = self.load_or_bootstrap().await?;
        self.store.set_running(address, true).await?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            Arc::clone(&self.pipeline).run(state.last_processed_lt, cancel.clone()),
        );
        *worker = Some(Worker { cancel, handle });

        info!(address, cursor = %state.last_processed_lt, "Indexer started");
        Ok(())
    }

    /// Stops the polling loop and waits for it to finish.
    ///
    /// The transaction in flight completes first; no new transaction is
    /// started afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the running flag cannot be persisted.
    pub async fn stop(&self) -> Result<(), IndexerError> {
        let address = self.contract_address();
        let mut worker = self.worker.lock().await;

        if let Some(Worker { cancel, handle }) = worker.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!(address, error = %e, "Polling loop task failed");
            }
        } else {
            debug!(address, "Stop requested with no running loop");
        }

        self.store.set_running(address, false).await?;
        info!(address, "Indexer stopped");
        Ok(())
    }

    /// Rewinds the cursor to `lt` so the next cycles replay history after it.
    ///
    /// Stored rows are kept; replayed transactions are recognised by hash and
    /// their side effects do not run again. A running loop is restarted at
    /// the new cursor.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidReindexTarget`] without touching any
    /// state if `lt` is not an unsigned integer, or a store error.
    pub async fn reindex_from(&self, lt: &str) -> Result<(), IndexerError> {
        let target: Lt = lt.trim().parse().map_err(ControlError::InvalidReindexTarget)?;
        let address = self.contract_address();

        info!(address, lt = %target, "Reindexing");

        let was_running = self.is_running().await;
        if was_running {
            self.stop().await?;
        }

        self.store.rewind_cursor(address, target).await?;

        if was_running {
            self.start().await?;
        }
        Ok(())
    }

    /// Returns the operator status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn status(&self) -> Result<IndexerStatus, IndexerError> {
        let address = self.contract_address();
        let state = self.store.load_state(address).await?;
        let is_running = self.is_running().await;
        if !is_running && state.as_ref().is_some_and(|s| s.is_running) {
            debug!(address, "Persisted running flag is stale");
        }
        let total_indexed = self.store.count_transactions(address, None).await?;
        let pending_processing = self.store.count_transactions(address, Some(false)).await?;

        Ok(IndexerStatus {
            contract_address: address.to_string(),
            is_running,
            last_processed_lt: state.as_ref().map_or(Lt::ZERO, |s| s.last_processed_lt),
            last_processed_time: state.and_then(|s| s.last_processed_time),
            total_indexed,
            pending_processing,
        })
    }

    /// Lists stored transactions of this contract, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list_transactions(
        &self,
        query: TransactionQuery,
    ) -> Result<TransactionPage, IndexerError> {
        let query = TransactionQuery {
            contract_address: Some(self.config.contract_address.clone()),
            ..query
        }
        .normalized();
        Ok(self.store.list_transactions(&query).await?)
    }

    /// Returns a stored transaction by hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn get_transaction(
        &self,
        hash: &str,
    ) -> Result<Option<IndexedTransaction>, IndexerError> {
        Ok(self.store.find_transaction(hash).await?)
    }

    /// Runs a single iteration from the persisted cursor.
    ///
    /// Intended for a stopped indexer, e.g. one-shot catch-up jobs.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn poll_once(&self) -> Result<IterationSummary, IndexerError> {
        self.metrics.record_poll();
        let state = self.load_or_bootstrap().await?;
        let mut cursor = state.last_processed_lt;
        self.pipeline
            .iterate(&mut cursor, &CancellationToken::new())
            .await
    }

    async fn load_or_bootstrap(&self) -> Result<IndexerState, IndexerError> {
        let address = self.contract_address();

        if let Some(state) = self.store.load_state(address).await? {
            info!(address, cursor = %state.last_processed_lt, "Resuming from stored cursor");
            return Ok(state);
        }

        let tip = if self.config.start_from_tip {
            let tip = self
                .pipeline
                .fetcher
                .account_tip(address, &CancellationToken::new())
                .await;
            if tip.is_none() {
                warn!(address, "Account tip unknown, starting from zero");
            }
            tip
        } else {
            None
        };

        let state = IndexerState::bootstrap(address, tip);
        info!(address, cursor = %state.last_processed_lt, "Bootstrapped indexer state");
        Ok(self.store.insert_state_if_absent(&state).await?)
    }
}

impl Drop for IndexerService {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut() {
            worker.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for IndexerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::campaigns::{Campaign, InMemoryCampaignDirectory};
    use crate::cursor::CursorUpdate;
    use crate::events::EventType;
    use crate::store::{MemoryStore, StoreError};
    use crate::testing::{self, hash_for, ChainStub};
    use crate::types::TxId;

    const ADDRESS: &str = "EQC1";

    fn config() -> IndexerConfig {
        IndexerConfig::with_contract(ADDRESS)
            .with_poll_interval(10)
            .with_fetch_retry(10, 1)
            .with_start_from_tip(false)
    }

    fn service_with(
        config: IndexerConfig,
        stub: &Arc<ChainStub>,
        store: Arc<dyn IndexStore>,
        campaigns: &InMemoryCampaignDirectory,
    ) -> IndexerService {
        IndexerService::new(
            config,
            Arc::clone(stub) as Arc<dyn TransactionSource>,
            store,
            Arc::new(campaigns.clone()),
        )
        .expect("service")
    }

    async fn wait_for_cursor(store: &MemoryStore, lt: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let state = store.load_state(ADDRESS).await.expect("load");
            if state.is_some_and(|s| s.last_processed_lt == Lt::new(lt)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cursor did not reach {lt}");
    }

    #[test]
    fn test_service_new_invalid_config() {
        let stub = Arc::new(ChainStub::new());
        let result = IndexerService::new(
            IndexerConfig::with_contract(""),
            stub as Arc<dyn TransactionSource>,
            Arc::new(MemoryStore::new()),
            Arc::new(InMemoryCampaignDirectory::new()),
        );
        assert_eq!(result.err(), Some(ConfigError::EmptyContractAddress));
    }

    #[tokio::test]
    async fn test_end_to_end_from_zero_cursor() {
        let stub = Arc::new(ChainStub::with_history(vec![
            testing::request(100, "EQbuyer"),
            testing::creation(90, "EQcreator", "EQjetton"),
            testing::unknown(80),
        ]));
        let store = Arc::new(MemoryStore::new());
        let campaigns = InMemoryCampaignDirectory::new();
        campaigns
            .insert(Campaign::pending("c1", "EQcreator", Utc::now()))
            .await;
        let service = service_with(config(), &stub, Arc::clone(&store) as Arc<dyn IndexStore>, &campaigns);

        assert_ok!(service.start().await);
        wait_for_cursor(&store, 100).await;
        assert_ok!(service.stop().await);

        let rows = store.transactions().await;
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.lt.get()).collect::<Vec<_>>(),
            vec![80, 90, 100]
        );
        assert!(rows.iter().all(|r| r.processed));
        assert_eq!(
            rows.iter().map(|r| r.event_type).collect::<Vec<_>>(),
            vec![EventType::Unknown, EventType::Creation, EventType::Request]
        );

        let status = service.status().await.expect("status");
        assert_eq!(status.last_processed_lt, Lt::new(100));
        assert_eq!(status.total_indexed, 3);
        assert_eq!(status.pending_processing, 0);
        assert!(!status.is_running);

        assert_eq!(
            campaigns.get("c1").await.expect("campaign").token_address.as_deref(),
            Some("EQjetton")
        );
    }

    #[tokio::test]
    async fn test_poll_once_processes_oldest_first() {
        let stub = Arc::new(ChainStub::with_history(vec![
            testing::request(100, "EQa"),
            testing::request(90, "EQa"),
            testing::request(80, "EQa"),
        ]));
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            config(),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );

        let summary = service.poll_once().await.expect("poll");
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.indexed, 3);

        // The cursor ends on the newest transaction only if it was last.
        let state = store.load_state(ADDRESS).await.expect("load").expect("state");
        assert_eq!(state.last_processed_lt, Lt::new(100));
        assert_eq!(store.transactions().await.len(), 3);

        let summary = service.poll_once().await.expect("poll");
        assert_eq!(summary.fetched, 0);
    }

    #[tokio::test]
    async fn test_start_bootstraps_from_tip() {
        let stub = Arc::new(ChainStub::with_history(vec![
            testing::request(100, "EQa"),
            testing::request(200, "EQa"),
        ]));
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            config().with_start_from_tip(true),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );

        assert_ok!(service.start().await);
        assert_ok!(service.stop().await);

        let state = store.load_state(ADDRESS).await.expect("load").expect("state");
        assert_eq!(state.last_processed_lt, Lt::new(200));
        assert_eq!(state.last_processed_hash, hash_for(200));
        assert!(store.transactions().await.is_empty());

        stub.extend([testing::request(300, "EQa")]);
        let summary = service.poll_once().await.expect("poll");
        assert_eq!(summary.indexed, 1);
        assert_eq!(store.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let stub = Arc::new(ChainStub::with_history(vec![testing::request(100, "EQa")]));
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            config(),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );

        assert_ok!(service.start().await);
        assert_ok!(service.start().await);
        assert!(service.is_running().await);

        wait_for_cursor(&store, 100).await;
        assert_ok!(service.stop().await);

        assert!(!service.is_running().await);
        assert_eq!(store.state_count().await, 1);
        assert_eq!(store.transactions().await.len(), 1);
        assert_eq!(service.metrics().duplicates_skipped(), 0);
    }

    #[tokio::test]
    async fn test_stop_then_start_resumes_from_cursor() {
        let stub = Arc::new(ChainStub::with_history(vec![testing::request(100, "EQa")]));
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            config(),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );

        assert_ok!(service.start().await);
        wait_for_cursor(&store, 100).await;
        assert_ok!(service.stop().await);
        let state = store.load_state(ADDRESS).await.expect("load").expect("state");
        assert!(!state.is_running);

        stub.extend([testing::request(200, "EQa")]);
        assert_ok!(service.start().await);
        let state = store.load_state(ADDRESS).await.expect("load").expect("state");
        assert!(state.is_running);
        wait_for_cursor(&store, 200).await;
        assert_ok!(service.stop().await);

        assert_eq!(store.transactions().await.len(), 2);
        assert_eq!(service.metrics().duplicates_skipped(), 0);
    }

    #[tokio::test]
    async fn test_reindex_replays_without_duplicates() {
        let stub = Arc::new(ChainStub::with_history(vec![
            testing::request(10, "EQa"),
            testing::creation(20, "EQcreator", "EQjetton"),
            testing::request(30, "EQa"),
        ]));
        let store = Arc::new(MemoryStore::new());
        let campaigns = InMemoryCampaignDirectory::new();
        campaigns
            .insert(Campaign::pending("c1", "EQcreator", Utc::now()))
            .await;
        let service = service_with(config(), &stub, Arc::clone(&store) as Arc<dyn IndexStore>, &campaigns);

        service.poll_once().await.expect("first pass");
        let before = store.transactions().await;
        assert_eq!(before.len(), 3);

        // A second pending campaign must not receive the replayed address.
        campaigns
            .insert(Campaign::pending("c2", "EQcreator", Utc::now()))
            .await;

        assert_ok!(service.reindex_from("0").await);
        let state = store.load_state(ADDRESS).await.expect("load").expect("state");
        assert_eq!(state.last_processed_lt, Lt::ZERO);

        let summary = service.poll_once().await.expect("replay");
        assert_eq!(summary.duplicates, 3);
        assert_eq!(summary.indexed, 0);

        let after = store.transactions().await;
        assert_eq!(after, before);
        assert!(campaigns.get("c2").await.expect("campaign").token_address.is_none());
        let state = store.load_state(ADDRESS).await.expect("load").expect("state");
        assert_eq!(state.last_processed_lt, Lt::new(30));
    }

    #[tokio::test]
    async fn test_reindex_restarts_running_loop() {
        let stub = Arc::new(ChainStub::with_history(vec![testing::request(100, "EQa")]));
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            config(),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );

        assert_ok!(service.start().await);
        wait_for_cursor(&store, 100).await;

        assert_ok!(service.reindex_from("50").await);
        assert!(service.is_running().await);
        wait_for_cursor(&store, 100).await;
        assert_ok!(service.stop().await);

        assert_eq!(store.transactions().await.len(), 1);
        assert!(service.metrics().duplicates_skipped() >= 1);
    }

    #[tokio::test]
    async fn test_reindex_invalid_lt_changes_nothing() {
        let stub = Arc::new(ChainStub::new());
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            config(),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );
        store
            .advance_cursor(&CursorUpdate::new(
                ADDRESS,
                TxId {
                    lt: Lt::new(500),
                    hash: "h500".to_string(),
                },
            ))
            .await
            .expect("seed");

        for bad in ["abc", "-5", "", "1.5"] {
            let result = service.reindex_from(bad).await;
            assert!(matches!(
                assert_err!(result),
                IndexerError::Control(ControlError::InvalidReindexTarget(_))
            ));
        }

        let state = store.load_state(ADDRESS).await.expect("load").expect("state");
        assert_eq!(state.last_processed_lt, Lt::new(500));
        assert_eq!(state.last_processed_hash, "h500");
    }

    #[tokio::test]
    async fn test_retry_exhaustion_leaves_cursor() {
        let stub = Arc::new(ChainStub::with_history(vec![testing::request(100, "EQa")]));
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            config(),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );
        store
            .rewind_cursor(ADDRESS, Lt::new(50))
            .await
            .expect("seed");
        stub.fail_next(10);

        let summary = service.poll_once().await.expect("poll");
        assert!(summary.no_data);
        assert_eq!(stub.calls(), 10);
        assert_eq!(service.metrics().fetch_failures(), 1);

        let state = store.load_state(ADDRESS).await.expect("load").expect("state");
        assert_eq!(state.last_processed_lt, Lt::new(50));
        assert!(store.transactions().await.is_empty());
    }

    /// Store whose transaction writes fail until `healthy` is set.
    struct FlakyStore {
        inner: MemoryStore,
        healthy: std::sync::atomic::AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), StoreError> {
            if self.healthy.load(std::sync::atomic::Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Corrupt("simulated outage".to_string()))
            }
        }
    }

    #[async_trait]
    impl IndexStore for FlakyStore {
        async fn load_state(&self, a: &str) -> Result<Option<IndexerState>, StoreError> {
            self.inner.load_state(a).await
        }
        async fn insert_state_if_absent(
            &self,
            s: &IndexerState,
        ) -> Result<IndexerState, StoreError> {
            self.inner.insert_state_if_absent(s).await
        }
        async fn set_running(&self, a: &str, r: bool) -> Result<(), StoreError> {
            self.inner.set_running(a, r).await
        }
        async fn rewind_cursor(&self, a: &str, lt: Lt) -> Result<(), StoreError> {
            self.inner.rewind_cursor(a, lt).await
        }
        async fn advance_cursor(&self, u: &CursorUpdate) -> Result<(), StoreError> {
            self.inner.advance_cursor(u).await
        }
        async fn find_transaction(
            &self,
            h: &str,
        ) -> Result<Option<IndexedTransaction>, StoreError> {
            self.inner.find_transaction(h).await
        }
        async fn insert_transaction(&self, r: &IndexedTransaction) -> Result<bool, StoreError> {
            self.check()?;
            self.inner.insert_transaction(r).await
        }
        async fn complete_transaction(
            &self,
            h: &str,
            u: &CursorUpdate,
        ) -> Result<(), StoreError> {
            self.inner.complete_transaction(h, u).await
        }
        async fn count_transactions(
            &self,
            a: &str,
            p: Option<bool>,
        ) -> Result<u64, StoreError> {
            self.inner.count_transactions(a, p).await
        }
        async fn list_transactions(
            &self,
            q: &TransactionQuery,
        ) -> Result<TransactionPage, StoreError> {
            self.inner.list_transactions(q).await
        }
    }

    #[tokio::test]
    async fn test_failed_iteration_does_not_kill_loop() {
        let stub = Arc::new(ChainStub::with_history(vec![testing::request(100, "EQa")]));
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            healthy: std::sync::atomic::AtomicBool::new(false),
        });
        let service = service_with(
            config(),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );

        assert_ok!(service.start().await);

        let deadline = Instant::now() + Duration::from_secs(5);
        while service.metrics().iteration_errors() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(service.metrics().iteration_errors() >= 1);
        assert!(service.is_running().await);

        store
            .healthy
            .store(true, std::sync::atomic::Ordering::SeqCst);
        wait_for_cursor(&store.inner, 100).await;
        assert_ok!(service.stop().await);

        assert_eq!(store.inner.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let stub = Arc::new(ChainStub::new());
        let service = service_with(
            config(),
            &stub,
            Arc::new(MemoryStore::new()),
            &InMemoryCampaignDirectory::new(),
        );
        assert_ok!(service.stop().await);
        assert!(!service.is_running().await);

        let status = service.status().await.expect("status");
        assert_eq!(status.last_processed_lt, Lt::ZERO);
        assert_eq!(status.total_indexed, 0);
        assert!(status.last_processed_time.is_none());
    }

    #[tokio::test]
    async fn test_status_ignores_stale_running_flag() {
        let stub = Arc::new(ChainStub::new());
        let store = Arc::new(MemoryStore::new());

        // Row left behind by a process that died while running.
        assert_ok!(store.insert_state_if_absent(&IndexerState::new(ADDRESS)).await);
        assert_ok!(store.set_running(ADDRESS, true).await);

        let service = service_with(
            config(),
            &stub,
            Arc::clone(&store) as Arc<dyn IndexStore>,
            &InMemoryCampaignDirectory::new(),
        );
        assert!(!service.status().await.expect("status").is_running);

        assert_ok!(service.start().await);
        assert!(service.status().await.expect("status").is_running);

        assert_ok!(service.stop().await);
        assert!(!service.status().await.expect("status").is_running);
    }
}
