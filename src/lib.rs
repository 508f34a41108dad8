//! Coinnovac transaction indexer.
//!
//! Umbrella crate re-exporting the workspace members.
//!
//! # Components
//!
//! - **Indexer**: Resumable polling indexer for the campaign factory contract
//! - **API**: Admin HTTP control surface for the indexer

pub use coinnovac_api as api;
pub use coinnovac_indexer as indexer;
