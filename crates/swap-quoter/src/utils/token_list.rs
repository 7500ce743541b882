use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::types::Token;

/// Load a token catalog from a JSON array `[{...}]` or a TOML file with a
/// `[[tokens]]` table array. Accepts absolute or relative paths.
pub fn load_token_list<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Vec<Token>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read token list {}", path.display()))?;
    parse_token_list(&text).with_context(|| format!("invalid token list {}", path.display()))
}

/// Parse catalog text in either supported format.
pub fn parse_token_list(text: &str) -> anyhow::Result<Vec<Token>> {
    // JSON first, then the TOML wrapper.
    if let Ok(tokens) = serde_json::from_str::<Vec<Token>>(text) {
        return check(tokens);
    }

    #[derive(Deserialize)]
    struct Wrapper {
        tokens: Vec<Token>,
    }
    let wrapper: Wrapper =
        toml::from_str(text).map_err(|e| anyhow!("token list is not valid JSON nor TOML: {}", e))?;
    check(wrapper.tokens)
}

fn check(tokens: Vec<Token>) -> anyhow::Result<Vec<Token>> {
    for t in &tokens {
        if t.symbol.trim().is_empty() || t.chain_id.trim().is_empty() {
            return Err(anyhow!("token entry {:?} needs a symbol and a chain id", t.name));
        }
    }
    Ok(tokens)
}
