//! Cache window tests for swap-quoter, driven through the pricing gateway.

use std::sync::Arc;
use std::time::Duration;

use swap_quoter::cache::{cache_key, TtlCache};
use swap_quoter::gateway::{GatewaySettings, PricingGateway};
use swap_quoter::source::StaticPriceSource;

fn gateway(source: Arc<StaticPriceSource>) -> PricingGateway {
    PricingGateway::new(source, GatewaySettings::default())
}

#[test]
fn test_cache_key_is_positional() {
    assert_eq!(cache_key("resolve_token", &[&"1", &"USDC"]), "resolve_token:1:USDC");
    assert_ne!(cache_key("op", &[&"a", &"b"]), cache_key("op", &[&"b", &"a"]));
}

#[tokio::test(start_paused = true)]
async fn test_cache_logic() {
    let mut cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(1_000));
    cache.put("k", 7);
    assert_eq!(cache.get("k"), Some(7));
    tokio::time::advance(Duration::from_millis(1_001)).await;
    assert_eq!(cache.get("k"), None);
    // Expired entries stay until overwritten.
    assert_eq!(cache.len(), 1);
    cache.put("k", 8);
    assert_eq!(cache.get("k"), Some(8));
    let metrics = cache.metrics();
    assert_eq!((metrics.hits, metrics.misses), (2, 1));
}

#[tokio::test(start_paused = true)]
async fn test_identical_lookups_within_ttl_hit_upstream_once() {
    let source = Arc::new(StaticPriceSource::new().with_token("1", "USDC", "0xa0b8", 1.0));
    let gw = gateway(source.clone());

    gw.resolve_token("1", "USDC").await.unwrap();
    tokio::time::advance(Duration::from_millis(29_999)).await;
    gw.resolve_token("1", "USDC").await.unwrap();
    assert_eq!(source.asset_calls(), 1);
    assert_eq!(gw.cache_metrics().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lookup_after_ttl_refetches() {
    let source = Arc::new(StaticPriceSource::new().with_token("1", "USDC", "0xa0b8", 1.0));
    let gw = gateway(source.clone());

    gw.resolve_token("1", "USDC").await.unwrap();
    tokio::time::advance(Duration::from_millis(30_001)).await;
    gw.resolve_token("1", "USDC").await.unwrap();
    assert_eq!(source.asset_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_price_and_token_entries_do_not_collide() {
    let source = Arc::new(StaticPriceSource::new().with_token("1", "USDC", "0xa0b8", 1.0));
    let gw = gateway(source.clone());

    gw.resolve_token("1", "USDC").await.unwrap();
    gw.resolve_price("1", "0xa0b8").await.unwrap();
    gw.resolve_price("1", "0xa0b8").await.unwrap();
    assert_eq!(source.asset_calls(), 1);
    assert_eq!(source.price_calls(), 1);

    gw.clear_cache();
    gw.resolve_price("1", "0xa0b8").await.unwrap();
    assert_eq!(source.price_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_not_cached() {
    let source = Arc::new(StaticPriceSource::new());
    let gw = gateway(source.clone());
    assert!(gw.resolve_token("1", "NOPE").await.is_err());
    let after_first = source.asset_calls();
    assert!(gw.resolve_token("1", "NOPE").await.is_err());
    assert_eq!(source.asset_calls(), after_first * 2);
}
