//! Swap calculator tests for swap-quoter.

use std::sync::Arc;

use swap_quoter::error::ErrorKind;
use swap_quoter::gateway::{GatewaySettings, PricingGateway};
use swap_quoter::source::{SourceError, StaticPriceSource};
use swap_quoter::validation::NotionalLimits;
use swap_quoter::{QuoteProvider, SwapCalculator, Token};

fn eth() -> Token {
    Token::new("ETH", "Ethereum", "8453")
}

fn usdc() -> Token {
    Token::new("USDC", "USD Coin", "1")
}

fn market() -> Arc<StaticPriceSource> {
    Arc::new(
        StaticPriceSource::new()
            .with_token("8453", "ETH", "0x4200000000000000000000000000000000000006", 3000.0)
            .with_token("1", "USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 1.0),
    )
}

fn calculator(source: Arc<StaticPriceSource>) -> SwapCalculator {
    let gateway = Arc::new(PricingGateway::new(source, GatewaySettings::default()));
    SwapCalculator::new(gateway, NotionalLimits::default())
}

#[tokio::test]
async fn test_eth_usdc_quote() {
    let calc = calculator(market());
    let quote = calc.calculate(&eth(), &usdc(), 300.0).await.unwrap();
    assert!((quote.from_token_amount - 0.1).abs() < 1e-12);
    assert!((quote.to_token_amount - 300.0).abs() < 1e-9);
    assert!((quote.implied_rate() - 3000.0).abs() < 1e-6);
    assert_eq!(quote.from_unit_price, 3000.0);
    assert_eq!(quote.to_unit_price, 1.0);
    assert_eq!(quote.price_impact, Some(0.0));
    assert!(quote.is_for(&eth(), &usdc(), 300.0));
}

#[tokio::test]
async fn test_amounts_scale_with_notional() {
    let calc = calculator(market());
    for usd in [0.01, 1.0, 42.5, 999_999.0] {
        let quote = calc.calculate(&eth(), &usdc(), usd).await.unwrap();
        assert!(quote.from_token_amount > 0.0);
        assert!(quote.to_token_amount > 0.0);
        assert!((quote.from_token_amount * quote.from_unit_price - usd).abs() < 1e-6 * usd.max(1.0));
        assert!((quote.to_token_amount * quote.to_unit_price - usd).abs() < 1e-6 * usd.max(1.0));
        assert!((quote.implied_rate() - 3000.0).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_identical_pair_rejected_before_network() {
    let source = market();
    let calc = calculator(source.clone());
    let err = calc.calculate(&eth(), &eth(), 100.0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_token_surfaces_upstream_error() {
    let calc = calculator(market());
    let err = calc.calculate(&Token::new("NOPE", "Nope", "1"), &usdc(), 100.0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retried_then_succeed() {
    let source = market();
    source.push_failure(SourceError::Transport("connection reset".into()));
    source.push_failure(SourceError::Transport("connection reset".into()));
    let gateway = PricingGateway::new(source.clone(), GatewaySettings::default());
    let token = gateway.resolve_token("1", "USDC").await.unwrap();
    assert_eq!(token.symbol, "USDC");
    assert_eq!(source.asset_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_network_error() {
    let source = market();
    for _ in 0..3 {
        source.push_failure(SourceError::Transport("connection refused".into()));
    }
    let gateway = PricingGateway::new(source.clone(), GatewaySettings::default());
    let err = gateway.resolve_token("1", "USDC").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(err.code(), Some("NETWORK_ERROR"));
    assert_eq!(source.asset_calls(), 3);
}

#[tokio::test]
async fn test_repeat_quotes_reuse_cached_lookups() {
    let source = market();
    let calc = calculator(source.clone());
    calc.calculate(&eth(), &usdc(), 100.0).await.unwrap();
    calc.calculate(&eth(), &usdc(), 250.0).await.unwrap();
    calc.calculate(&usdc(), &eth(), 250.0).await.unwrap();
    assert_eq!(source.asset_calls(), 2);
    assert_eq!(source.price_calls(), 2);
}
