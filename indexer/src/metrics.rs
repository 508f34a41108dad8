//! Indexer metrics.
//!
//! Provides atomic counters for monitoring fetching and processing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::events::EventType;

/// Metrics for one indexer instance.
#[derive(Debug)]
pub struct IndexerMetrics {
    /// New rows written.
    transactions_indexed: AtomicU64,

    /// Rows classified as `creation`.
    creations: AtomicU64,

    /// Rows classified as `request`.
    requests: AtomicU64,

    /// Rows classified as `unknown`.
    unknown: AtomicU64,

    /// Transactions skipped because their hash was already stored.
    duplicates_skipped: AtomicU64,

    /// Transactions recorded without a payload.
    parse_failures: AtomicU64,

    /// Side effects that failed.
    dispatch_failures: AtomicU64,

    /// Fetch cycles that exhausted their retries.
    fetch_failures: AtomicU64,

    /// Loop iterations that raised an error.
    iteration_errors: AtomicU64,

    /// Loop iterations started.
    poll_cycles: AtomicU64,

    /// Total processing time in nanoseconds.
    total_processing_time_ns: AtomicU64,

    /// Start time for rate calculation.
    start_time: Instant,
}

impl Default for IndexerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexerMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transactions_indexed: AtomicU64::new(0),
            creations: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            iteration_errors: AtomicU64::new(0),
            poll_cycles: AtomicU64::new(0),
            total_processing_time_ns: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a newly indexed transaction.
    pub fn record_indexed(&self, event_type: EventType, duration: Duration) {
        self.transactions_indexed.fetch_add(1, Ordering::Relaxed);
        let counter = match event_type {
            EventType::Creation => &self.creations,
            EventType::Request => &self.requests,
            EventType::Unknown => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_ns.fetch_add(
            u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Records a transaction skipped by the hash check.
    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a payload that could not be extracted.
    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed side effect.
    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a fetch cycle that gave up.
    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed loop iteration.
    pub fn record_iteration_error(&self) {
        self.iteration_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the start of a loop iteration.
    pub fn record_poll(&self) {
        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of newly indexed transactions.
    #[must_use]
    pub fn transactions_indexed(&self) -> u64 {
        self.transactions_indexed.load(Ordering::Relaxed)
    }

    /// Returns the number of duplicates skipped.
    #[must_use]
    pub fn duplicates_skipped(&self) -> u64 {
        self.duplicates_skipped.load(Ordering::Relaxed)
    }

    /// Returns the number of parse failures.
    #[must_use]
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of dispatch failures.
    #[must_use]
    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of exhausted fetch cycles.
    #[must_use]
    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of failed iterations.
    #[must_use]
    pub fn iteration_errors(&self) -> u64 {
        self.iteration_errors.load(Ordering::Relaxed)
    }

    /// Returns the number of loop iterations.
    #[must_use]
    pub fn poll_cycles(&self) -> u64 {
        self.poll_cycles.load(Ordering::Relaxed)
    }

    /// Returns the average processing time per indexed transaction.
    #[must_use]
    pub fn average_processing_time(&self) -> Duration {
        let count = self.transactions_indexed();
        if count == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_processing_time_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / count)
    }

    /// Returns indexed transactions per second since start.
    #[must_use]
    pub fn transactions_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_indexed() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_indexed: self.transactions_indexed(),
            creations: self.creations.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped(),
            parse_failures: self.parse_failures(),
            dispatch_failures: self.dispatch_failures(),
            fetch_failures: self.fetch_failures(),
            iteration_errors: self.iteration_errors(),
            poll_cycles: self.poll_cycles(),
            average_processing_time_us: u64::try_from(
                self.average_processing_time().as_micros(),
            )
            .unwrap_or(u64::MAX),
            transactions_per_second: self.transactions_per_second(),
        }
    }
}

/// A point-in-time snapshot of indexer metrics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// New rows written.
    pub transactions_indexed: u64,
    /// `creation` rows.
    pub creations: u64,
    /// `request` rows.
    pub requests: u64,
    /// `unknown` rows.
    pub unknown: u64,
    /// Duplicates skipped.
    pub duplicates_skipped: u64,
    /// Payload extraction failures.
    pub parse_failures: u64,
    /// Side-effect failures.
    pub dispatch_failures: u64,
    /// Exhausted fetch cycles.
    pub fetch_failures: u64,
    /// Failed iterations.
    pub iteration_errors: u64,
    /// Iterations started.
    pub poll_cycles: u64,
    /// Average processing time in microseconds.
    pub average_processing_time_us: u64,
    /// Indexing rate.
    pub transactions_per_second: f64,
}
