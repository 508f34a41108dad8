//! TonCenter HTTP client.
//!
//! Single-shot requests against the TonCenter v2 REST API. Retries are the
//! fetcher's job, so every call here makes exactly one attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::RpcError;
use super::types::{
    AccountState, RawAccountState, RawTransaction, RpcEnvelope, TransactionsRequest,
};
use super::TransactionSource;

/// Default TonCenter endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://testnet.toncenter.com/api/v2";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest error body kept in [`RpcError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// RPC client configuration.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Base URL of the v2 API, without trailing method name.
    pub base_url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Optional API key, sent as `X-API-Key`.
    pub api_key: Option<String>,

    /// User agent string.
    pub user_agent: String,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            api_key: None,
            user_agent: format!("coinnovac-indexer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RpcClientConfig {
    /// Creates a configuration for the given endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute http(s) URL or
    /// the timeout is zero.
    pub fn validate(&self) -> Result<(), RpcError> {
        let url =
            Url::parse(&self.base_url).map_err(|e| RpcError::InvalidConfig(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(RpcError::InvalidConfig(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        if self.timeout.is_zero() {
            return Err(RpcError::InvalidConfig("timeout must be > 0".to_string()));
        }

        Ok(())
    }
}

/// HTTP client for the TonCenter v2 API.
#[derive(Debug, Clone)]
pub struct TonCenterClient {
    config: RpcClientConfig,
    http: reqwest::Client,
}

impl TonCenterClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: RpcClientConfig) -> Result<Self, RpcError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = config.api_key {
            if let Ok(value) = HeaderValue::from_str(api_key) {
                headers.insert("X-API-Key", value);
            }
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { config, http })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &RpcClientConfig {
        &self.config
    }

    fn url(&self, method: &str, params: &[(&str, String)]) -> Result<Url, RpcError> {
        let raw = format!("{}/{}", self.config.base_url.trim_end_matches('/'), method);
        let mut url = Url::parse(&raw).map_err(|e| RpcError::InvalidConfig(e.to_string()))?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, RpcError> {
        let url = self.url(method, params)?;
        debug!(%url, "RPC request");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RpcError::Status {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        decode_envelope(&body)
    }
}

#[async_trait]
impl TransactionSource for TonCenterClient {
    async fn get_transactions(
        &self,
        request: &TransactionsRequest,
    ) -> Result<Vec<RawTransaction>, RpcError> {
        let mut params = vec![
            ("address", request.address.clone()),
            ("limit", request.limit.to_string()),
            ("to_lt", request.to_lt.to_string()),
            ("archival", "true".to_string()),
        ];

        if let Some(before) = &request.before {
            params.push(("lt", before.lt.to_string()));
            params.push(("hash", before.hash.clone()));
        }

        let txs: Option<Vec<RawTransaction>> = self.get("getTransactions", &params).await?;
        Ok(txs.unwrap_or_default())
    }

    async fn get_account_state(&self, address: &str) -> Result<Option<AccountState>, RpcError> {
        let state: Option<RawAccountState> = self
            .get("getAddressInformation", &[("address", address.to_string())])
            .await?;
        Ok(state.map(AccountState::from))
    }
}

/// Decodes a `{ok, result}` envelope.
///
/// `ok: true` with a missing or null result yields `None`.
///
/// # Errors
///
/// Returns [`RpcError::Deserialization`] for malformed JSON and
/// [`RpcError::Api`] when the provider reports `ok: false`.
pub fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<Option<T>, RpcError> {
    let envelope: RpcEnvelope<T> =
        serde_json::from_str(body).map_err(|e| RpcError::Deserialization(e.to_string()))?;

    if !envelope.ok {
        return Err(RpcError::Api {
            code: envelope.code.unwrap_or(0),
            message: envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    Ok(envelope.result)
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RpcClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(config.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RpcClientConfig::new("https://toncenter.com/api/v2")
            .with_timeout(Duration::from_secs(5))
            .with_api_key(Some("secret".to_string()));

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.api_key.as_deref(), Some("secret"));

        let config = config.with_api_key(Some(String::new()));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_config_validate_invalid() {
        assert!(RpcClientConfig::new("not a url").validate().is_err());
        assert!(RpcClientConfig::new("ftp://example.com").validate().is_err());
        assert!(RpcClientConfig::default()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_client_url() {
        let client =
            TonCenterClient::new(RpcClientConfig::new("https://toncenter.com/api/v2/"))
                .expect("client");

        let url = client
            .url(
                "getTransactions",
                &[("address", "EQ+/x".to_string()), ("limit", "10".to_string())],
            )
            .expect("url");

        assert_eq!(url.path(), "/api/v2/getTransactions");
        assert_eq!(url.query(), Some("address=EQ%2B%2Fx&limit=10"));
    }

    #[test]
    fn test_decode_envelope_ok() {
        let decoded: Option<Vec<RawTransaction>> =
            decode_envelope(r#"{"ok": true, "result": []}"#).expect("decode");
        assert_eq!(decoded.map(|v| v.len()), Some(0));

        let decoded: Option<Vec<RawTransaction>> =
            decode_envelope(r#"{"ok": true, "result": null}"#).expect("decode");
        assert!(decoded.is_none());
    }

    #[test]
    fn test_decode_envelope_errors() {
        let err = decode_envelope::<Vec<RawTransaction>>("<html>502</html>")
            .expect_err("malformed");
        assert!(matches!(err, RpcError::Deserialization(_)));

        let err = decode_envelope::<Vec<RawTransaction>>(
            r#"{"ok": false, "error": "LITE_SERVER_UNKNOWN", "code": 500}"#,
        )
        .expect_err("api error");
        assert!(matches!(err, RpcError::Api { code: 500, .. }));
    }

    #[test]
    fn test_truncate() {
        let short = truncate("short".to_string());
        assert_eq!(short, "short");

        let long = truncate("é".repeat(MAX_ERROR_BODY));
        assert!(long.len() <= MAX_ERROR_BODY);
    }
}
