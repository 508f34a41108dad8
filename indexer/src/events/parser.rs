//! Event payload extraction.

use super::types::{CreationEvent, EventType, ParsedEvent, RequestEvent};
use crate::error::ParseError;
use crate::types::Transaction;

/// Extracts the typed payload for `event_type` from `tx`.
///
/// # Errors
///
/// Returns [`ParseError::MissingField`] when a field the event type needs is
/// absent. Callers record the transaction without a payload.
pub fn parse_event(tx: &Transaction, event_type: EventType) -> Result<ParsedEvent, ParseError> {
    match event_type {
        EventType::Creation => {
            let first = tx
                .out_msgs
                .first()
                .ok_or(ParseError::MissingField("out_msgs[0]"))?;

            let emitted_address = first
                .destination
                .clone()
                .ok_or(ParseError::MissingField("out_msgs[0].destination"))?;

            Ok(ParsedEvent::Creation(CreationEvent {
                emitted_address,
                actor: tx.in_msg.as_ref().map(|msg| msg.source.clone()),
                value: first.value,
                timestamp: tx.utime,
            }))
        }
        EventType::Request => {
            let msg = tx
                .in_msg
                .as_ref()
                .ok_or(ParseError::MissingField("in_msg"))?;

            Ok(ParsedEvent::Request(RequestEvent {
                actor: msg.source.clone(),
                value: msg.value,
                timestamp: tx.utime,
            }))
        }
        EventType::Unknown => Ok(ParsedEvent::Unknown),
    }
}
