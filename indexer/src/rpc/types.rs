//! Wire types of the TonCenter v2 HTTP API.
//!
//! Only the fields the indexer reads are modelled; everything is optional
//! because providers omit fields freely.

use serde::{Deserialize, Deserializer};

use crate::types::{Lt, TxId};

/// Response envelope: `{ok, result, error, code}`.
#[derive(Debug, Deserialize)]
pub struct RpcEnvelope<T> {
    /// Whether the provider handled the request.
    #[serde(default)]
    pub ok: bool,
    /// Payload, absent on errors and on some empty answers.
    pub result: Option<T>,
    /// Provider error message.
    #[serde(default)]
    pub error: Option<String>,
    /// Provider error code.
    #[serde(default)]
    pub code: Option<i64>,
}

/// Parameters of a `getTransactions` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionsRequest {
    /// Account to read.
    pub address: String,
    /// Page size.
    pub limit: u32,
    /// Start the page at this transaction (inclusive), newest-first.
    pub before: Option<TxId>,
    /// Stop at this logical time; only newer transactions are returned.
    pub to_lt: Lt,
}

/// `transaction_id` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransactionId {
    /// Logical time as decimal string.
    #[serde(default, deserialize_with = "lenient_string")]
    pub lt: Option<String>,
    /// Base64 transaction hash.
    #[serde(default)]
    pub hash: Option<String>,
}

/// A message as reported by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    /// Sender address, empty for external messages.
    #[serde(default)]
    pub source: Option<String>,
    /// Receiver address.
    #[serde(default)]
    pub destination: Option<String>,
    /// Value in nanotons.
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
    /// Hash of the message body.
    #[serde(default)]
    pub body_hash: Option<String>,
    /// Decoded text comment or raw body.
    #[serde(default)]
    pub message: Option<String>,
}

/// A transaction as reported by the provider, newest-first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransaction {
    /// Transaction identifier.
    #[serde(default)]
    pub transaction_id: Option<RawTransactionId>,
    /// Unix time of the transaction.
    #[serde(default)]
    pub utime: Option<i64>,
    /// Alternative time field used by some providers.
    #[serde(default)]
    pub now: Option<i64>,
    /// Inbound message.
    #[serde(default)]
    pub in_msg: Option<RawMessage>,
    /// Outbound messages.
    #[serde(default)]
    pub out_msgs: Vec<RawMessage>,
}

/// `getAddressInformation` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAccountState {
    /// Balance in nanotons.
    #[serde(default, deserialize_with = "lenient_string")]
    pub balance: Option<String>,
    /// Most recent transaction of the account.
    #[serde(default)]
    pub last_transaction_id: Option<RawTransactionId>,
}

/// Tip of an account: its most recent transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    /// Balance in nanotons, as reported.
    pub balance: String,
    /// Last transaction, absent for accounts without history.
    pub last_transaction: Option<TxId>,
}

impl From<RawAccountState> for AccountState {
    fn from(raw: RawAccountState) -> Self {
        let last_transaction = raw.last_transaction_id.and_then(|id| {
            let lt = id.lt?.parse::<Lt>().ok()?;
            Some(TxId {
                lt,
                hash: id.hash.unwrap_or_default(),
            })
        });

        Self {
            balance: raw.balance.unwrap_or_else(|| "0".to_string()),
            last_transaction,
        }
    }
}

/// Accepts a JSON string or number and keeps it as text.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
