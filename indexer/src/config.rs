//! Indexer configuration.
//!
//! Provides configuration options for one indexer instance and their
//! environment-variable loader.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetcher::RetryPolicy;
use crate::rpc::RpcClientConfig;

/// Default factory contract address.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "EQBY-OWwam2n7DO25xV7juUWS9MV9xjJ1bwL1dISkYDNcGP2";

/// Configuration for one indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Contract account to index.
    pub contract_address: String,

    /// TonCenter v2 base URL.
    pub rpc_endpoint: String,

    /// Optional TonCenter API key.
    pub rpc_api_key: Option<String>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Page size for history requests.
    pub batch_size: u32,

    /// Sleep between empty polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Attempts per RPC call before giving up for the cycle.
    pub fetch_max_attempts: u32,

    /// Fixed delay between RPC attempts in milliseconds.
    pub fetch_retry_delay_ms: u64,

    /// Bootstrap a new cursor at the account tip instead of zero.
    pub start_from_tip: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
            rpc_endpoint: crate::rpc::client::DEFAULT_ENDPOINT.to_string(),
            rpc_api_key: None,
            rpc_timeout_secs: crate::rpc::client::DEFAULT_TIMEOUT_SECS,
            batch_size: 100,
            poll_interval_ms: 15_000,
            fetch_max_attempts: 10,
            fetch_retry_delay_ms: 1_000,
            start_from_tip: true,
        }
    }
}

impl IndexerConfig {
    /// Creates a configuration for the given contract.
    #[must_use]
    pub fn with_contract(contract_address: impl Into<String>) -> Self {
        Self {
            contract_address: contract_address.into(),
            ..Default::default()
        }
    }

    /// Sets the RPC endpoint and API key.
    #[must_use]
    pub fn with_rpc(mut self, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        self.rpc_endpoint = endpoint.into();
        self.rpc_api_key = api_key;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Sets the fetch retry bound and delay.
    #[must_use]
    pub fn with_fetch_retry(mut self, max_attempts: u32, delay_ms: u64) -> Self {
        self.fetch_max_attempts = max_attempts;
        self.fetch_retry_delay_ms = delay_ms;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets how a new cursor is bootstrapped.
    #[must_use]
    pub fn with_start_from_tip(mut self, start_from_tip: bool) -> Self {
        self.start_from_tip = start_from_tip;
        self
    }

    /// Loads the configuration from environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result fails
    /// validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            contract_address: env::var("FACTORY_ADDRESS").unwrap_or(defaults.contract_address),
            rpc_endpoint: env::var("TON_ENDPOINT").unwrap_or(defaults.rpc_endpoint),
            rpc_api_key: env::var("TON_API_KEY").ok().filter(|k| !k.is_empty()),
            rpc_timeout_secs: env_parse("RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs)?,
            batch_size: env_parse("INDEXER_BATCH_SIZE", defaults.batch_size)?,
            poll_interval_ms: env_parse("INDEXER_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            fetch_max_attempts: env_parse("INDEXER_FETCH_ATTEMPTS", defaults.fetch_max_attempts)?,
            fetch_retry_delay_ms: env_parse(
                "INDEXER_FETCH_RETRY_DELAY_MS",
                defaults.fetch_retry_delay_ms,
            )?,
            start_from_tip: env_parse("INDEXER_START_FROM_TIP", defaults.start_from_tip)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.contract_address.trim().is_empty() {
            return Err(ConfigError::EmptyContractAddress);
        }

        if self.rpc_endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        if self.fetch_max_attempts == 0 {
            return Err(ConfigError::InvalidFetchAttempts);
        }

        Ok(())
    }

    /// Returns the sleep between empty polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the sleep after a failed iteration: twice the poll interval.
    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.saturating_mul(2))
    }

    /// Returns the fetch retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch_max_attempts,
            delay: Duration::from_millis(self.fetch_retry_delay_ms),
        }
    }

    /// Returns the RPC client configuration.
    #[must_use]
    pub fn rpc_client_config(&self) -> RpcClientConfig {
        RpcClientConfig::new(self.rpc_endpoint.clone())
            .with_timeout(Duration::from_secs(self.rpc_timeout_secs))
            .with_api_key(self.rpc_api_key.clone())
    }
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Missing contract address.
    #[error("contract_address must not be empty")]
    EmptyContractAddress,

    /// Missing RPC endpoint.
    #[error("rpc_endpoint must not be empty")]
    EmptyEndpoint,

    /// Zero page size.
    #[error("batch_size must be > 0")]
    InvalidBatchSize,

    /// Zero poll interval.
    #[error("poll_interval_ms must be > 0")]
    InvalidPollInterval,

    /// Zero attempts.
    #[error("fetch_max_attempts must be > 0")]
    InvalidFetchAttempts,

    /// An environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}
