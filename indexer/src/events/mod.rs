//! Event processing for the indexer.
//!
//! # Components
//!
//! - [`types`]: EventType, ParsedEvent, IndexedTransaction
//! - [`classifier`]: coarse classification by message shape
//! - [`parser`]: payload extraction per event type
//! - [`processor`]: TransactionProcessor, the dedup-persist-dispatch pipeline

pub mod classifier;
pub mod parser;
pub mod processor;
pub mod types;

pub use classifier::classify;
pub use parser::parse_event;
pub use processor::TransactionProcessor;
pub use types::{
    CreationEvent, EventType, IndexedTransaction, ParsedEvent, ProcessOutcome, RequestEvent,
    UnknownEventType,
};
