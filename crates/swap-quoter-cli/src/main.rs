mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
// Use prelude for Decimal and common traits like FromPrimitive
use rust_decimal::prelude::*;
use swap_quoter::config::AppConfig;
use swap_quoter::tokens::supported_tokens;
use swap_quoter::utils::token_list::load_token_list;
use swap_quoter::{HttpPriceSource, PricingGateway, SwapCalculator, Token};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, CliHandler, Command};

// Helper to round an amount for display
pub(crate) fn format_decimal(value: f64, dp: u32) -> String {
    match Decimal::from_f64(value) {
        Some(d) => d.round_dp(dp).normalize().to_string(),
        None => format!("{}", value),
    }
}

fn load_catalog(tokens_file: Option<&str>) -> Result<Vec<Token>> {
    match tokens_file {
        Some(path) => load_token_list(path),
        None => Ok(supported_tokens()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Listing the catalog needs no credentials.
    if let Command::Tokens = cli.command {
        let tokens_file = cli.config.tokens_file.clone().or_else(|| std::env::var("TOKENS_FILE").ok());
        CliHandler::handle_tokens(&load_catalog(tokens_file.as_deref())?);
        return Ok(());
    }

    // CLI flags, then --config file, then env vars
    let config = AppConfig::load_with_cli(cli.config)?;
    let catalog = load_catalog(config.tokens_file.as_deref())?;

    let source = HttpPriceSource::new(&config.api_base_url, &config.api_key, config.request_timeout)?;
    let gateway = Arc::new(PricingGateway::new(Arc::new(source), config.gateway_settings()));
    let calculator = Arc::new(SwapCalculator::new(gateway, config.notional_limits()));

    let handler = CliHandler { config, catalog, calculator };
    match cli.command {
        Command::Quote(args) => handler.handle_quote(&args).await,
        Command::Repl => handler.handle_repl().await,
        Command::Tokens => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_decimal_rounds() {
        assert_eq!(format_decimal(0.1234567, 6), "0.123457");
        assert_eq!(format_decimal(3000.0, 6), "3000");
        assert_eq!(format_decimal(f64::NAN, 2), "NaN");
    }
}
