//! Event classification.
//!
//! A two-tier heuristic over message shape; message bodies are not decoded.

use rust_decimal::Decimal;

use super::types::EventType;
use crate::types::Transaction;

/// Assigns a coarse event type to a transaction.
///
/// - `Creation`: the transaction emitted at least one outbound message.
/// - `Request`: no outbound messages, inbound message with positive value.
/// - `Unknown`: anything else.
#[must_use]
pub fn classify(tx: &Transaction) -> EventType {
    if !tx.out_msgs.is_empty() {
        return EventType::Creation;
    }

    match &tx.in_msg {
        Some(msg) if msg.value > Decimal::ZERO => EventType::Request,
        _ => EventType::Unknown,
    }
}
