//! Types for classified and persisted transactions.
//!
//! Defines the coarse event tag, the typed per-event payload and the
//! persisted `IndexedTransaction` row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{InMessage, Lt, OutMessage, Transaction};

/// Coarse classification of a factory transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The contract sent one or more messages onward (deployment).
    Creation,
    /// A funded inbound request that produced no outbound messages.
    Request,
    /// Neither pattern matched.
    Unknown,
}

impl EventType {
    /// Returns the stored name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Request => "request",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized event type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creation" => Ok(Self::Creation),
            "request" => Ok(Self::Request),
            "unknown" => Ok(Self::Unknown),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

/// Payload of a `creation` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationEvent {
    /// Destination of the first outbound message: the deployed contract.
    pub emitted_address: String,
    /// Sender of the inbound message that triggered the deployment.
    pub actor: Option<String>,
    /// Value carried by the first outbound message.
    pub value: Decimal,
    /// Unix time of the transaction.
    pub timestamp: i64,
}

/// Payload of a `request` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    /// Sender of the inbound message.
    pub actor: String,
    /// Value carried by the inbound message.
    pub value: Decimal,
    /// Unix time of the transaction.
    pub timestamp: i64,
}

/// Typed payload extracted from a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedEvent {
    /// Contract deployment observed.
    Creation(CreationEvent),
    /// Funded request observed.
    Request(RequestEvent),
    /// Nothing to extract.
    Unknown,
}

impl ParsedEvent {
    /// Returns the event type this payload belongs to.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Creation(_) => EventType::Creation,
            Self::Request(_) => EventType::Request,
            Self::Unknown => EventType::Unknown,
        }
    }
}

/// A persisted transaction row, one per unique hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedTransaction {
    /// Unique transaction hash.
    pub hash: String,
    /// Logical time.
    pub lt: Lt,
    /// Unix timestamp.
    pub utime: i64,
    /// Indexed account.
    pub contract_address: String,
    /// Inbound message.
    pub in_msg: Option<InMessage>,
    /// Outbound messages.
    pub out_msgs: Vec<OutMessage>,
    /// Classification tag.
    pub event_type: EventType,
    /// Extracted payload, absent if parsing failed.
    pub parsed_data: Option<ParsedEvent>,
    /// True once side effects ran or were deliberately skipped.
    pub processed: bool,
    /// When the row was first written.
    pub created_at: DateTime<Utc>,
}

impl IndexedTransaction {
    /// Builds a new, not yet processed row for `tx`.
    #[must_use]
    pub fn new(
        tx: &Transaction,
        contract_address: &str,
        event_type: EventType,
        parsed_data: Option<ParsedEvent>,
    ) -> Self {
        Self {
            hash: tx.hash.clone(),
            lt: tx.lt,
            utime: tx.utime,
            contract_address: contract_address.to_string(),
            in_msg: tx.in_msg.clone(),
            out_msgs: tx.out_msgs.clone(),
            event_type,
            parsed_data,
            processed: false,
            created_at: Utc::now(),
        }
    }
}

/// What happened to one transaction fed through the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Newly indexed; side effects ran and the row is processed.
    Indexed {
        /// Classification of the transaction.
        event_type: EventType,
    },
    /// Newly indexed but dispatch failed; the row stays unprocessed.
    DispatchFailed {
        /// Classification of the transaction.
        event_type: EventType,
    },
    /// A row with this hash already existed; nothing was re-executed.
    Duplicate,
}

impl ProcessOutcome {
    /// Returns true if a new row was written.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}
