//! Normalized transaction types.
//!
//! Provides the logical-time cursor unit and the normalized view of a
//! contract transaction that every stage after the fetcher works with.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseError;
use crate::rpc::types::{RawMessage, RawTransaction};

/// Logical time of a transaction.
///
/// Monotonically increasing per account; used as the pagination and
/// resumption cursor. Serialized as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lt(u64);

impl Lt {
    /// The zero cursor, before any transaction.
    pub const ZERO: Self = Self(0);

    /// Creates a logical time from its integer value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the integer value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Lt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Lt {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseError::InvalidLt(s.to_string()))
    }
}

impl From<u64> for Lt {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for Lt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
            Repr::Number(n) => Ok(Self(n)),
        }
    }
}

/// Identifier of a transaction on an account: `(lt, hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxId {
    /// Logical time.
    pub lt: Lt,
    /// Transaction hash.
    pub hash: String,
}

/// Inbound message of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMessage {
    /// Sender address.
    pub source: String,
    /// Receiver address.
    pub destination: String,
    /// Attached value in nanotons.
    pub value: Decimal,
    /// Body reference (hash or raw payload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Outbound message emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutMessage {
    /// Sender address.
    pub source: String,
    /// Receiver address, absent for external-out messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Attached value in nanotons.
    pub value: Decimal,
    /// Body reference (hash or raw payload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A normalized transaction of the indexed account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction hash.
    pub hash: String,
    /// Logical time.
    pub lt: Lt,
    /// Unix timestamp.
    pub utime: i64,
    /// Inbound message, if it came from another account.
    pub in_msg: Option<InMessage>,
    /// Outbound messages.
    pub out_msgs: Vec<OutMessage>,
}

impl Transaction {
    /// Returns the `(lt, hash)` identifier.
    #[must_use]
    pub fn id(&self) -> TxId {
        TxId {
            lt: self.lt,
            hash: self.hash.clone(),
        }
    }

    /// Normalizes a provider transaction for the account at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction id is missing or its `lt` is not
    /// an integer.
    pub fn from_raw(raw: &RawTransaction, address: &str) -> Result<Self, ParseError> {
        let id = raw
            .transaction_id
            .as_ref()
            .ok_or(ParseError::MissingField("transaction_id"))?;

        let hash = id
            .hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or(ParseError::MissingField("transaction_id.hash"))?
            .to_string();

        let lt = id
            .lt
            .as_deref()
            .ok_or(ParseError::MissingField("transaction_id.lt"))?
            .parse::<Lt>()?;

        let utime = raw.utime.or(raw.now).unwrap_or(0);

        let in_msg = raw.in_msg.as_ref().and_then(|msg| {
            let source = non_empty(msg.source.as_deref())?;
            Some(InMessage {
                source: source.to_string(),
                destination: non_empty(msg.destination.as_deref())
                    .unwrap_or(address)
                    .to_string(),
                value: parse_value(msg.value.as_deref()),
                body: body_ref(msg),
            })
        });

        let out_msgs = raw
            .out_msgs
            .iter()
            .map(|msg| OutMessage {
                source: non_empty(msg.source.as_deref())
                    .unwrap_or(address)
                    .to_string(),
                destination: non_empty(msg.destination.as_deref()).map(str::to_string),
                value: parse_value(msg.value.as_deref()),
                body: body_ref(msg),
            })
            .collect();

        Ok(Self {
            hash,
            lt,
            utime,
            in_msg,
            out_msgs,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_value(value: Option<&str>) -> Decimal {
    value
        .and_then(|v| Decimal::from_str(v.trim()).ok())
        .unwrap_or(Decimal::ZERO)
}

fn body_ref(msg: &RawMessage) -> Option<String> {
    non_empty(msg.body_hash.as_deref())
        .or_else(|| non_empty(msg.message.as_deref()))
        .map(str::to_string)
}
