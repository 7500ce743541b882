//! Swap calculator: turns a token pair and a USD notional into a quote.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::{QuoteError, Result};
use crate::gateway::PricingGateway;
use crate::types::{PriceInfo, SwapQuote, Token};
use crate::validation::{validate_token_selection, validate_usd_amount, NotionalLimits};

/// Anything that can price a swap. The session depends on this seam rather
/// than on the calculator directly.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn calculate(&self, from: &Token, to: &Token, usd_notional: f64) -> Result<SwapQuote>;

    /// Quote `amount` units of `from`, with the notional priced at the live
    /// USD price of `from`.
    async fn calculate_for_amount(&self, from: &Token, to: &Token, amount: f64) -> Result<SwapQuote>;
}

pub struct SwapCalculator {
    gateway: Arc<PricingGateway>,
    limits: NotionalLimits,
}

impl SwapCalculator {
    pub fn new(gateway: Arc<PricingGateway>, limits: NotionalLimits) -> Self {
        Self { gateway, limits }
    }

    pub fn gateway(&self) -> &Arc<PricingGateway> {
        &self.gateway
    }

    pub fn limits(&self) -> &NotionalLimits {
        &self.limits
    }

    async fn usable_price(&self, token: &Token, address: &str) -> Result<PriceInfo> {
        let price = self.gateway.resolve_price(&token.chain_id, address).await?;
        if !price.is_usable() {
            return Err(QuoteError::resolution(format!(
                "No usable USD price for {} on chain {}",
                token.symbol, token.chain_id
            )));
        }
        Ok(price)
    }

    /// Resolve both tokens, then both USD prices.
    async fn price_pair(&self, from: &Token, to: &Token) -> Result<(f64, f64)> {
        let (from_info, to_info) = futures::try_join!(
            self.gateway.resolve_token(&from.chain_id, &from.symbol),
            self.gateway.resolve_token(&to.chain_id, &to.symbol)
        )?;

        let (from_address, to_address) = match (from_info.price_address(), to_info.price_address()) {
            (Some(f), Some(t)) => (f, t),
            (None, _) => {
                return Err(QuoteError::resolution(format!("Token address not found for {}", from.symbol)))
            }
            (_, None) => {
                return Err(QuoteError::resolution(format!("Token address not found for {}", to.symbol)))
            }
        };

        let (from_price, to_price) = futures::try_join!(
            self.usable_price(&from_info, from_address),
            self.usable_price(&to_info, to_address)
        )?;
        Ok((from_price.price_usd, to_price.price_usd))
    }
}

fn build_quote(from: &Token, to: &Token, usd_notional: f64, from_price: f64, to_price: f64) -> SwapQuote {
    let quote = SwapQuote {
        from_token: from.clone(),
        to_token: to.clone(),
        usd_notional,
        from_token_amount: usd_notional / from_price,
        to_token_amount: usd_notional / to_price,
        from_unit_price: from_price,
        to_unit_price: to_price,
        price_impact: Some(0.0),
        quoted_at: Utc::now(),
    };
    debug!(
        from = %from.symbol,
        to = %to.symbol,
        usd_notional,
        rate = quote.implied_rate(),
        "quote computed"
    );
    quote
}

#[async_trait]
impl QuoteProvider for SwapCalculator {
    async fn calculate(&self, from: &Token, to: &Token, usd_notional: f64) -> Result<SwapQuote> {
        validate_token_selection(Some(from), Some(to))?;
        validate_usd_amount(usd_notional, &self.limits)?;
        let (from_price, to_price) = self.price_pair(from, to).await?;
        Ok(build_quote(from, to, usd_notional, from_price, to_price))
    }

    async fn calculate_for_amount(&self, from: &Token, to: &Token, amount: f64) -> Result<SwapQuote> {
        validate_token_selection(Some(from), Some(to))?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(QuoteError::validation("Amount must be greater than zero"));
        }
        let (from_price, to_price) = self.price_pair(from, to).await?;
        let usd_notional = amount * from_price;
        validate_usd_amount(usd_notional, &self.limits)?;
        Ok(build_quote(from, to, usd_notional, from_price, to_price))
    }
}
