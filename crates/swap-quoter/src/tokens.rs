//! Built-in chain and token catalog.

use serde::{Deserialize, Serialize};

use crate::types::Token;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub id: String,
    pub name: String,
}

pub fn supported_chains() -> Vec<Chain> {
    [("1", "Ethereum"), ("137", "Polygon"), ("8453", "Base")]
        .into_iter()
        .map(|(id, name)| Chain { id: id.to_string(), name: name.to_string() })
        .collect()
}

/// Default tokens offered when no token list is configured.
pub fn supported_tokens() -> Vec<Token> {
    vec![
        Token::new("USDC", "USD Coin", "1"),
        Token::new("USDT", "Tether", "137"),
        Token::new("ETH", "Ethereum", "8453"),
        Token::new("WBTC", "Wrapped Bitcoin", "1"),
    ]
}

/// Look a token up by symbol (case-insensitive) and, optionally, chain.
/// Without a chain the first match wins.
pub fn find_token<'a>(catalog: &'a [Token], symbol: &str, chain_id: Option<&str>) -> Option<&'a Token> {
    catalog.iter().find(|t| {
        t.symbol.eq_ignore_ascii_case(symbol) && chain_id.map_or(true, |c| t.chain_id == c)
    })
}

pub fn chain_name(chain_id: &str) -> Option<String> {
    supported_chains().into_iter().find(|c| c.id == chain_id).map(|c| c.name)
}
