//! Pricing gateway: cached, retried and timed-out access to the pricing
//! source, with upstream failures normalized into [`QuoteError`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::cache::{cache_key, CacheMetrics, TtlCache, DEFAULT_CACHE_TTL};
use crate::error::{QuoteError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::source::{PriceSource, SourceError};
use crate::types::{PriceInfo, Token};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Tuning knobs for [`PricingGateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    pub retry: RetryPolicy,
    /// Upper bound for each individual upstream attempt.
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Payloads stored in the gateway cache.
#[derive(Debug, Clone)]
enum Lookup {
    Token(Token),
    Price(PriceInfo),
}

pub struct PricingGateway {
    source: Arc<dyn PriceSource>,
    cache: RwLock<TtlCache<Lookup>>,
    settings: GatewaySettings,
}

impl PricingGateway {
    pub fn new(source: Arc<dyn PriceSource>, settings: GatewaySettings) -> Self {
        Self {
            source,
            cache: RwLock::new(TtlCache::new(settings.cache_ttl)),
            settings,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Resolve token metadata by chain and symbol.
    pub async fn resolve_token(&self, chain_id: &str, symbol: &str) -> Result<Token> {
        let key = cache_key("resolve_token", &[&chain_id, &symbol]);
        if let Some(Lookup::Token(token)) = self.cached(&key) {
            debug!(%key, "cache hit");
            return Ok(token);
        }
        debug!(%key, "cache miss");

        let record = self
            .call_upstream(|| self.source.asset_by_symbol(chain_id, symbol))
            .await?;

        let token = Token {
            symbol: record.symbol.unwrap_or_else(|| symbol.to_string()),
            name: record.name.unwrap_or_else(|| symbol.to_string()),
            chain_id: chain_id.to_string(),
            address: record.address,
            decimals: record.decimals,
        };
        self.store(key, Lookup::Token(token.clone()));
        Ok(token)
    }

    /// Resolve the USD price of the token at `address`.
    ///
    /// A missing or unusable upstream price yields `price_usd == 0.0` rather
    /// than an error.
    pub async fn resolve_price(&self, chain_id: &str, address: &str) -> Result<PriceInfo> {
        let key = cache_key("resolve_price", &[&chain_id, &address]);
        if let Some(Lookup::Price(price)) = self.cached(&key) {
            debug!(%key, "cache hit");
            return Ok(price);
        }
        debug!(%key, "cache miss");

        let asset = self
            .call_upstream(|| self.source.asset_price(chain_id, address))
            .await?;

        let price_usd = match asset.unit_price {
            Some(p) if p.is_finite() && p >= 0.0 => p,
            other => {
                warn!(chain_id, address, unit_price = ?other, "no usable upstream price, defaulting to 0");
                0.0
            }
        };
        let price = PriceInfo {
            price_usd,
            price_change_24h: asset.price_change_24h,
            market_cap: asset.market_cap,
            volume_24h: asset.volume_24h,
        };
        self.store(key, Lookup::Price(price.clone()));
        Ok(price)
    }

    pub fn clear_cache(&self) {
        self.cache.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).metrics()
    }

    fn cached(&self, key: &str) -> Option<Lookup> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).get(key)
    }

    fn store(&self, key: String, value: Lookup) {
        self.cache.write().unwrap_or_else(PoisonError::into_inner).put(key, value);
    }

    /// Retry-wrapped upstream call; every attempt is bounded by the request
    /// timeout and a timeout counts as a transient failure.
    async fn call_upstream<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, SourceError>>,
    {
        let timeout = self.settings.request_timeout;
        with_retry(self.settings.retry, || {
            let attempt = op();
            async move {
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Transport(format!(
                        "request timed out after {} ms",
                        timeout.as_millis()
                    ))),
                }
            }
        })
        .await
        .map_err(normalize)
    }
}

/// Map an upstream failure onto the caller-facing taxonomy.
pub fn normalize(error: SourceError) -> QuoteError {
    match error {
        SourceError::Transport(reason) => QuoteError::network(Some(json!({ "reason": reason }))),
        SourceError::Status { status, message, body } => QuoteError::Upstream {
            message: if message.is_empty() { "API request failed".to_string() } else { message },
            code: Some(status.to_string()),
            details: body,
        },
        SourceError::Decode(message) | SourceError::Other(message) => QuoteError::unknown(if message.is_empty() {
            "An unexpected error occurred".to_string()
        } else {
            message
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::{AssetPrice, AssetRecord, StaticPriceSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source whose first `stalls` calls never answer.
    struct StallingSource {
        stalls: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSource for StallingSource {
        async fn asset_by_symbol(&self, _chain_id: &str, symbol: &str) -> std::result::Result<AssetRecord, SourceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.stalls {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
            }
            Ok(AssetRecord { symbol: Some(symbol.to_string()), address: Some("0xabc".into()), ..Default::default() })
        }

        async fn asset_price(&self, _chain_id: &str, _address: &str) -> std::result::Result<AssetPrice, SourceError> {
            Ok(AssetPrice { unit_price: Some(1.0), ..Default::default() })
        }
    }

    fn gateway(source: Arc<StaticPriceSource>) -> PricingGateway {
        PricingGateway::new(source, GatewaySettings::default())
    }

    #[tokio::test]
    async fn test_token_name_falls_back_to_symbol() {
        let source = Arc::new(StaticPriceSource::new());
        source.insert_asset(
            "1",
            "WBTC",
            AssetRecord { address: Some("0x2260".into()), ..Default::default() },
        );
        let token = gateway(source).resolve_token("1", "WBTC").await.unwrap();
        assert_eq!(token.symbol, "WBTC");
        assert_eq!(token.name, "WBTC");
        assert_eq!(token.address.as_deref(), Some("0x2260"));
    }

    #[tokio::test]
    async fn test_missing_price_defaults_to_zero() {
        let source = Arc::new(StaticPriceSource::new());
        source.insert_price("1", "0xdead", AssetPrice::default());
        let price = gateway(source).resolve_price("1", "0xdead").await.unwrap();
        assert_eq!(price.price_usd, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_after_retries() {
        let source = Arc::new(StaticPriceSource::new());
        let gw = gateway(source.clone());
        let err = gw.resolve_token("1", "NOPE").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.code(), Some("404"));
        assert_eq!(source.asset_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let source = Arc::new(StaticPriceSource::new().with_token("1", "USDC", "0xa0b8", 1.0));
        source.push_failure(SourceError::Transport("connection reset".into()));
        let token = gateway(source.clone()).resolve_token("1", "USDC").await.unwrap();
        assert_eq!(token.symbol, "USDC");
        assert_eq!(source.asset_calls(), 2);
    }

    #[test]
    fn test_normalize_shapes() {
        assert_eq!(normalize(SourceError::Transport("x".into())).kind(), ErrorKind::Network);
        let upstream = normalize(SourceError::Status { status: 500, message: String::new(), body: None });
        assert_eq!(upstream.message(), "API request failed");
        assert_eq!(upstream.code(), Some("500"));
        assert_eq!(normalize(SourceError::Decode("bad json".into())).kind(), ErrorKind::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempts_time_out_and_exhaust() {
        let source = Arc::new(StallingSource { stalls: usize::MAX, calls: AtomicUsize::new(0) });
        let gw = PricingGateway::new(source.clone(), GatewaySettings::default());
        let start = tokio::time::Instant::now();
        let err = gw.resolve_token("1", "USDC").await.unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        // Three timed-out attempts plus two backoffs.
        assert!(elapsed >= Duration::from_secs(32), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(33), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempt_is_retried() {
        let source = Arc::new(StallingSource { stalls: 1, calls: AtomicUsize::new(0) });
        let settings = GatewaySettings { request_timeout: Duration::from_millis(500), ..Default::default() };
        let gw = PricingGateway::new(source.clone(), settings);
        let start = tokio::time::Instant::now();
        let token = gw.resolve_token("1", "USDC").await.unwrap();

        assert_eq!(token.address.as_deref(), Some("0xabc"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(1_500));
    }
}
