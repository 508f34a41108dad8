//! Shared handler state.

use std::sync::Arc;

use coinnovac_indexer::IndexerService;

/// State shared by all admin handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The indexer instance under control.
    pub indexer: Arc<IndexerService>,
}

impl AppState {
    /// Creates state around an indexer.
    #[must_use]
    pub fn new(indexer: Arc<IndexerService>) -> Self {
        Self { indexer }
    }
}
