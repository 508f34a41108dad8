//! RPC error types.

/// Errors talking to the blockchain RPC provider.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// HTTP request failed (connection, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider answered with a non-success HTTP status.
    #[error("HTTP status {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Response body was not the expected JSON.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Provider returned `ok: false`.
    #[error("RPC error [{code}]: {message}")]
    Api {
        /// Provider error code, 0 when missing.
        code: i64,
        /// Provider error message.
        message: String,
    },

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RpcError {
    /// Returns true for failures a later attempt may not hit again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidConfig(_))
    }
}
