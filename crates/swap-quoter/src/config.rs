//! Configuration loading, env vars, CLI flags.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

#[cfg(feature = "cli")]
use clap::Parser;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::error::QuoteError;
use crate::gateway::{GatewaySettings, DEFAULT_REQUEST_TIMEOUT};
use crate::retry::{RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use crate::session::DEFAULT_DEBOUNCE;
use crate::source::DEFAULT_API_BASE_URL;
use crate::validation::{NotionalLimits, DEFAULT_USD_AMOUNT, MAX_USD_AMOUNT, MIN_USD_AMOUNT};

pub const DEFAULT_CHAIN_ID: &str = "1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub chain_id: String,
    pub request_timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
    pub cache_ttl: Duration,
    pub debounce: Duration,
    pub min_usd_amount: f64,
    pub max_usd_amount: f64,
    pub default_usd_amount: f64,
    pub tokens_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub chain_id: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub cache_ttl_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub min_usd_amount: Option<f64>,
    pub max_usd_amount: Option<f64>,
    pub default_usd_amount: Option<f64>,
    pub tokens_file: Option<String>,
}

#[cfg(feature = "cli")]
#[derive(Parser, Debug, Default, Clone)]
pub struct CliConfig {
    /// TOML file with settings; flags override it.
    #[arg(long, global = true)]
    pub config: Option<String>,
    #[arg(long, global = true)]
    pub api_key: Option<String>,
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    #[arg(long, global = true)]
    pub chain_id: Option<String>,
    #[arg(long, global = true)]
    pub request_timeout_ms: Option<u64>,
    #[arg(long, global = true)]
    pub retries: Option<u32>,
    #[arg(long, global = true)]
    pub retry_backoff_ms: Option<u64>,
    #[arg(long, global = true)]
    pub cache_ttl_ms: Option<u64>,
    #[arg(long, global = true)]
    pub debounce_ms: Option<u64>,
    #[arg(long, global = true)]
    pub tokens_file: Option<String>,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn require_api_key(key: Option<String>) -> Result<String, QuoteError> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or_else(|| QuoteError::Config("FUNKIT_API_KEY is not set; a pricing API key is required".to_string()))
}

impl AppConfig {
    /// Environment only.
    pub fn load() -> Result<Self, QuoteError> {
        Self::layered(FileConfig::default())
    }

    /// Read a TOML settings file.
    pub fn read_file(path: &str) -> Result<FileConfig, QuoteError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| QuoteError::Config(format!("unable to read config {}: {}", path, e)))?;
        toml::from_str::<FileConfig>(&contents)
            .map_err(|e| QuoteError::Config(format!("invalid config {}: {}", path, e)))
    }

    /// File values first, then environment, then defaults.
    fn layered(file_config: FileConfig) -> Result<Self, QuoteError> {
        let api_key = require_api_key(file_config.api_key.or_else(|| env_string("FUNKIT_API_KEY")))?;
        let api_base_url = file_config
            .api_base_url
            .or_else(|| env_string("FUNKIT_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let chain_id = file_config
            .chain_id
            .or_else(|| env_string("CHAIN_ID"))
            .unwrap_or_else(|| DEFAULT_CHAIN_ID.to_string());
        let request_timeout = file_config
            .request_timeout_ms
            .or_else(|| env_parse("REQUEST_TIMEOUT_MS"))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let retries = file_config.retries.or_else(|| env_parse("RETRIES")).unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let retry_backoff = file_config
            .retry_backoff_ms
            .or_else(|| env_parse("RETRY_BACKOFF_MS"))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BACKOFF);
        let cache_ttl = file_config
            .cache_ttl_ms
            .or_else(|| env_parse("CACHE_TTL_MS"))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CACHE_TTL);
        let debounce = file_config
            .debounce_ms
            .or_else(|| env_parse("DEBOUNCE_MS"))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);
        let tokens_file = file_config.tokens_file.or_else(|| env_string("TOKENS_FILE"));
        if tokens_file.is_none() {
            info!("TOKENS_FILE not set, using the built-in token catalog");
        }

        let config = Self {
            api_key,
            api_base_url,
            chain_id,
            request_timeout,
            retries,
            retry_backoff,
            cache_ttl,
            debounce,
            min_usd_amount: file_config.min_usd_amount.unwrap_or(MIN_USD_AMOUNT),
            max_usd_amount: file_config.max_usd_amount.unwrap_or(MAX_USD_AMOUNT),
            default_usd_amount: file_config.default_usd_amount.unwrap_or(DEFAULT_USD_AMOUNT),
            tokens_file,
        };
        if config.min_usd_amount > config.max_usd_amount {
            return Err(QuoteError::Config(format!(
                "min_usd_amount {} exceeds max_usd_amount {}",
                config.min_usd_amount, config.max_usd_amount
            )));
        }
        Ok(config)
    }

    /// CLI flags over the `--config` file over the environment over defaults.
    #[cfg(feature = "cli")]
    pub fn load_with_cli(cli: CliConfig) -> Result<Self, QuoteError> {
        let mut file_config = match cli.config {
            Some(ref path) => Self::read_file(path)?,
            None => FileConfig::default(),
        };
        file_config.api_key = cli.api_key.or(file_config.api_key);
        file_config.api_base_url = cli.api_url.or(file_config.api_base_url);
        file_config.chain_id = cli.chain_id.or(file_config.chain_id);
        file_config.request_timeout_ms = cli.request_timeout_ms.or(file_config.request_timeout_ms);
        file_config.retries = cli.retries.or(file_config.retries);
        file_config.retry_backoff_ms = cli.retry_backoff_ms.or(file_config.retry_backoff_ms);
        file_config.cache_ttl_ms = cli.cache_ttl_ms.or(file_config.cache_ttl_ms);
        file_config.debounce_ms = cli.debounce_ms.or(file_config.debounce_ms);
        file_config.tokens_file = cli.tokens_file.or(file_config.tokens_file);
        Self::layered(file_config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries).with_backoff(self.retry_backoff)
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            retry: self.retry_policy(),
            request_timeout: self.request_timeout,
            cache_ttl: self.cache_ttl,
        }
    }

    pub fn notional_limits(&self) -> NotionalLimits {
        NotionalLimits { min: self.min_usd_amount, max: self.max_usd_amount }
    }
}
