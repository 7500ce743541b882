//! Upstream asset-pricing collaborator: the trait seam, an HTTP client and an
//! in-memory source for tests and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::error::QuoteError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.fun.xyz/v1";
const API_KEY_HEADER: &str = "X-Api-Key";

/// Asset metadata as returned by the upstream API. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub decimals: Option<u8>,
}

/// Price data as returned by the upstream API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPrice {
    pub unit_price: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
}

/// Failure shapes an upstream call can take, before normalization.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// No response reached us (connect failure, timeout, dropped connection).
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream answered with a failure status.
    #[error("upstream returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

/// The two lookups the quoter needs from a pricing provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Resolve an ERC-20-like asset by chain and symbol.
    async fn asset_by_symbol(&self, chain_id: &str, symbol: &str) -> Result<AssetRecord, SourceError>;

    /// Resolve price info for an asset by chain and contract address.
    async fn asset_price(&self, chain_id: &str, address: &str) -> Result<AssetPrice, SourceError>;
}

/// Pricing source backed by the REST asset API.
#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl HttpPriceSource {
    /// Build a client. The API key is mandatory.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, QuoteError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(QuoteError::Config("pricing API key is required".to_string()));
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuoteError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        debug!(url, "GET");
        let response = self
            .http_client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::parse_error_response(status, response).await);
        }
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Transport(format!("timed out reading response body: {}", e))
            } else {
                SourceError::Decode(format!("failed to deserialize response: {}", e))
            }
        })
    }

    async fn parse_error_response(status: StatusCode, response: reqwest::Response) -> SourceError {
        let body = match response.text().await {
            Ok(text) => serde_json::from_str::<Value>(&text)
                .ok()
                .or_else(|| (!text.is_empty()).then(|| Value::String(text))),
            Err(_) => None,
        };
        let message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("API request failed")
            .to_string();
        SourceError::Status { status: status.as_u16(), message, body }
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn asset_by_symbol(&self, chain_id: &str, symbol: &str) -> Result<AssetRecord, SourceError> {
        let url = format!("{}/asset/erc20/{}/{}", self.base_url, chain_id, symbol);
        self.get(&url).await
    }

    async fn asset_price(&self, chain_id: &str, address: &str) -> Result<AssetPrice, SourceError> {
        let url = format!("{}/asset/erc20/price/{}/{}", self.base_url, chain_id, address);
        self.get(&url).await
    }
}

/// In-memory pricing source. Counts calls and can be told to fail.
#[derive(Default)]
pub struct StaticPriceSource {
    assets: Mutex<HashMap<(String, String), AssetRecord>>,
    prices: Mutex<HashMap<(String, String), AssetPrice>>,
    failures: Mutex<VecDeque<SourceError>>,
    asset_calls: AtomicUsize,
    price_calls: AtomicUsize,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token with its address and USD price in one go.
    pub fn with_token(self, chain_id: &str, symbol: &str, address: &str, price_usd: f64) -> Self {
        self.insert_asset(
            chain_id,
            symbol,
            AssetRecord {
                symbol: Some(symbol.to_string()),
                name: None,
                address: Some(address.to_string()),
                decimals: Some(18),
            },
        );
        self.insert_price(chain_id, address, AssetPrice { unit_price: Some(price_usd), ..Default::default() });
        self
    }

    pub fn insert_asset(&self, chain_id: &str, symbol: &str, record: AssetRecord) {
        lock(&self.assets).insert((chain_id.to_string(), symbol.to_string()), record);
    }

    pub fn insert_price(&self, chain_id: &str, address: &str, price: AssetPrice) {
        lock(&self.prices).insert((chain_id.to_string(), address.to_lowercase()), price);
    }

    /// Queue a failure; the next call of either kind consumes it.
    pub fn push_failure(&self, error: SourceError) {
        lock(&self.failures).push_back(error);
    }

    pub fn asset_calls(&self) -> usize {
        self.asset_calls.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.asset_calls() + self.price_calls()
    }

    fn next_failure(&self) -> Option<SourceError> {
        lock(&self.failures).pop_front()
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn asset_by_symbol(&self, chain_id: &str, symbol: &str) -> Result<AssetRecord, SourceError> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        lock(&self.assets)
            .get(&(chain_id.to_string(), symbol.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::Status {
                status: 404,
                message: format!("asset {} not found on chain {}", symbol, chain_id),
                body: None,
            })
    }

    async fn asset_price(&self, chain_id: &str, address: &str) -> Result<AssetPrice, SourceError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        lock(&self.prices)
            .get(&(chain_id.to_string(), address.to_lowercase()))
            .cloned()
            .ok_or_else(|| SourceError::Status {
                status: 404,
                message: format!("no price for {} on chain {}", address, chain_id),
                body: None,
            })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
