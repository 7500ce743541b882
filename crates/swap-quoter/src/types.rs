//! Common data models: tokens, prices and swap quotes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A token on a specific chain.
///
/// Identity is the `(symbol, chain_id)` pair; name, address and decimals do
/// not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub name: String,
    pub chain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

impl Token {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, chain_id: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            chain_id: chain_id.into(),
            address: None,
            decimals: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// True when both tokens name the same asset on the same chain.
    pub fn same_asset(&self, other: &Token) -> bool {
        self.symbol == other.symbol && self.chain_id == other.chain_id
    }

    /// Address usable for a price lookup, ignoring blank strings.
    pub fn price_address(&self) -> Option<&str> {
        self.address.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.same_asset(other)
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
        self.chain_id.hash(state);
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (chain {})", self.symbol, self.chain_id)
    }
}

/// USD price data for one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub price_usd: f64,
    pub price_change_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
}

impl PriceInfo {
    pub fn new(price_usd: f64) -> Self {
        Self { price_usd, price_change_24h: None, market_cap: None, volume_24h: None }
    }

    /// Strictly positive and finite.
    pub fn is_usable(&self) -> bool {
        self.price_usd.is_finite() && self.price_usd > 0.0
    }
}

/// A quote for swapping a USD notional from one token into another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapQuote {
    pub from_token: Token,
    pub to_token: Token,
    pub usd_notional: f64,
    pub from_token_amount: f64,
    pub to_token_amount: f64,
    pub from_unit_price: f64,
    pub to_unit_price: f64,
    /// Always `Some(0.0)`: there is no liquidity model behind the quote.
    pub price_impact: Option<f64>,
    pub quoted_at: DateTime<Utc>,
}

impl SwapQuote {
    /// Units of `to_token` received per unit of `from_token`.
    pub fn implied_rate(&self) -> f64 {
        self.to_token_amount / self.from_token_amount
    }

    /// Whether this quote still describes the given request.
    pub fn is_for(&self, from: &Token, to: &Token, usd_notional: f64) -> bool {
        self.from_token == *from && self.to_token == *to && self.usd_notional == usd_notional
    }

    /// The same quote seen from the other side of the pair.
    pub fn inverted(&self) -> SwapQuote {
        SwapQuote {
            from_token: self.to_token.clone(),
            to_token: self.from_token.clone(),
            usd_notional: self.usd_notional,
            from_token_amount: self.to_token_amount,
            to_token_amount: self.from_token_amount,
            from_unit_price: self.to_unit_price,
            to_unit_price: self.from_unit_price,
            price_impact: self.price_impact,
            quoted_at: self.quoted_at,
        }
    }
}
