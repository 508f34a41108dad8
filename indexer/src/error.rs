//! Indexer error types.

use crate::config::ConfigError;
use crate::store::StoreError;

/// Malformed transaction or event payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A required field is absent or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A logical time is not an unsigned integer.
    #[error("invalid logical time: {0:?}")]
    InvalidLt(String),
}

/// Invalid operator request; raised before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The reindex target is not a valid logical time.
    #[error("invalid reindex target: {0}")]
    InvalidReindexTarget(#[source] ParseError),
}

/// Top-level indexer errors.
///
/// Provider and side-effect failures never surface here: the fetcher turns
/// the former into an empty cycle and the processor records the latter on
/// the row.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistent store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid operator request.
    #[error(transparent)]
    Control(#[from] ControlError),
}
