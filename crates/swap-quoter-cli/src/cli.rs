//! CLI subcommand logic, output formatting, user interaction.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::history::MemHistory;
use rustyline::Editor;
use swap_quoter::config::{AppConfig, CliConfig};
use swap_quoter::session::{Phase, QuoteSession, SessionSnapshot};
use swap_quoter::tokens::{chain_name, find_token};
use swap_quoter::validation::{parse_amount, sanitize_numeric_input};
use swap_quoter::{QuoteProvider, SwapCalculator, SwapQuote, Token};
use tracing::debug;

use crate::format_decimal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Token swap quotes from live USD prices", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: CliConfig,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a single quote and exit.
    Quote(QuoteArgs),
    /// List the token catalog.
    Tokens,
    /// Interactive quote session.
    Repl,
}

#[derive(Args, Debug, Clone)]
pub struct QuoteArgs {
    /// Token to sell, as SYMBOL or SYMBOL@CHAIN.
    #[arg(long)]
    pub from: String,
    /// Token to buy, as SYMBOL or SYMBOL@CHAIN.
    #[arg(long)]
    pub to: String,
    /// Amount of the sell token.
    #[arg(long, conflicts_with = "usd", required_unless_present = "usd")]
    pub amount: Option<f64>,
    /// USD notional to quote.
    #[arg(long)]
    pub usd: Option<f64>,
}

/// Resolve `SYMBOL` or `SYMBOL@CHAIN` against the catalog. Unknown symbols
/// become ad-hoc tokens on the given or default chain.
pub fn parse_token_arg(catalog: &[Token], arg: &str, default_chain: &str) -> Token {
    let (symbol, chain) = match arg.split_once('@') {
        Some((s, c)) => (s.trim(), Some(c.trim())),
        None => (arg.trim(), None),
    };
    find_token(catalog, symbol, chain)
        .cloned()
        .unwrap_or_else(|| {
            let symbol = symbol.to_uppercase();
            Token::new(symbol.clone(), symbol, chain.unwrap_or(default_chain))
        })
}

/// Handles CLI commands and output.
pub struct CliHandler {
    pub config: AppConfig,
    pub catalog: Vec<Token>,
    pub calculator: Arc<SwapCalculator>,
}

impl CliHandler {
    /// Handle a quote command: resolve tokens, price the notional, print the result.
    pub async fn handle_quote(&self, args: &QuoteArgs) -> Result<()> {
        let from = parse_token_arg(&self.catalog, &args.from, &self.config.chain_id);
        let to = parse_token_arg(&self.catalog, &args.to, &self.config.chain_id);

        debug!(%from, %to, usd = ?args.usd, amount = ?args.amount, "one-shot quote");
        let quote = match (args.usd, args.amount) {
            (Some(usd), _) => self.calculator.calculate(&from, &to, usd).await?,
            (None, Some(amount)) => self.calculator.calculate_for_amount(&from, &to, amount).await?,
            (None, None) => return Err(anyhow!("either --amount or --usd is required")),
        };
        print_quote(&quote);
        let metrics = self.calculator.gateway().cache_metrics();
        debug!(hits = metrics.hits, misses = metrics.misses, "cache metrics");
        Ok(())
    }

    pub fn handle_tokens(catalog: &[Token]) {
        for token in catalog {
            let chain = chain_name(&token.chain_id).unwrap_or_else(|| token.chain_id.clone());
            match &token.address {
                Some(address) => println!("{:<8} {:<20} {:<10} {}", token.symbol, token.name, chain, address),
                None => println!("{:<8} {:<20} {}", token.symbol, token.name, chain),
            }
        }
    }

    /// Interactive REPL mode for quoting
    pub async fn handle_repl(&self) -> Result<()> {
        let provider: Arc<dyn QuoteProvider> = self.calculator.clone();
        let session = QuoteSession::new(provider, self.config.debounce);

        let default_from = find_token(&self.catalog, "ETH", None).cloned();
        let default_to = find_token(&self.catalog, "USDC", None).cloned();
        if let (Some(from), Some(to)) = (default_from, default_to) {
            session.set_pair(from, to);
            session.edit_usd_amount(self.config.default_usd_amount);
            render(&session.settled().await);
        }

        let mut rl = Editor::<(), MemHistory>::with_history(Default::default(), MemHistory::new())
            .context("failed to start line editor")?;
        println!("Entering swap-quoter REPL. Type 'help' for usage, 'exit' to quit.");
        loop {
            let readline = tokio::task::block_in_place(|| rl.readline("> "));
            match readline {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line);
                    if !self.repl_command(&session, line).await {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Run one REPL line. Returns false when the user asked to quit.
    async fn repl_command(&self, session: &QuoteSession, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = parts.collect();
        match (cmd.as_str(), args.as_slice()) {
            ("from", [amount]) => {
                session.edit_from_amount(sanitize_numeric_input(amount));
                render(&session.settled().await);
            }
            ("to", [amount]) => {
                session.edit_to_amount(sanitize_numeric_input(amount));
                render(&session.snapshot());
            }
            ("usd", [amount]) => match parse_amount(&sanitize_numeric_input(amount)) {
                Some(usd) => {
                    session.edit_usd_amount(usd);
                    render(&session.settled().await);
                }
                None => println!("Please enter a valid number"),
            },
            ("pair", [from, to]) => {
                session.set_pair(
                    parse_token_arg(&self.catalog, from, &self.config.chain_id),
                    parse_token_arg(&self.catalog, to, &self.config.chain_id),
                );
                render(&session.settled().await);
            }
            ("swap", []) => {
                session.swap_sides();
                render(&session.snapshot());
                render(&session.settled().await);
            }
            ("refresh", []) => {
                session.recalculate();
                render(&session.settled().await);
            }
            ("dismiss", []) => {
                session.dismiss_error();
                render(&session.snapshot());
            }
            ("reset", []) => {
                session.reset();
                render(&session.snapshot());
            }
            ("show", []) => render(&session.snapshot()),
            ("tokens", []) => Self::handle_tokens(&self.catalog),
            ("help", _) => print_help(),
            ("exit", _) | ("quit", _) => return false,
            _ => println!("Unknown command '{}'. Type 'help' for usage.", line),
        }
        true
    }
}

fn print_help() {
    println!("Commands:");
    println!("  from <amount>       set the amount to sell");
    println!("  to <amount>         set the amount to receive (uses the last rate)");
    println!("  usd <amount>        quote a USD notional");
    println!("  pair <FROM> <TO>    select tokens, as SYMBOL or SYMBOL@CHAIN");
    println!("  swap                exchange the two sides");
    println!("  refresh             recompute now");
    println!("  dismiss             clear the current error");
    println!("  reset               clear everything");
    println!("  show                print the current state");
    println!("  tokens              list known tokens");
    println!("  exit                quit");
}

pub fn print_quote(quote: &SwapQuote) {
    let from = &quote.from_token.symbol;
    let to = &quote.to_token.symbol;
    println!("Quote for ${} {} -> {}:", format_decimal(quote.usd_notional, 2), from, to);
    println!("- Selling: {} {}", format_decimal(quote.from_token_amount, 6), from);
    println!("- Receiving: {} {}", format_decimal(quote.to_token_amount, 6), to);
    println!("- {} price: ${}", from, format_decimal(quote.from_unit_price, 6));
    println!("- {} price: ${}", to, format_decimal(quote.to_unit_price, 6));
    println!("- Rate: 1 {} = {} {}", from, format_decimal(quote.implied_rate(), 6), to);
    match quote.price_impact {
        Some(impact) => println!("- Price Impact: {}%", format_decimal(impact, 2)),
        None => println!("- Price Impact: N/A"),
    }
    println!("- Quoted at: {}", quote.quoted_at.to_rfc3339());
}

fn render(view: &SessionSnapshot) {
    let symbol = |t: &Option<Token>| t.as_ref().map_or_else(|| "?".to_string(), |t| t.symbol.clone());
    let field = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    let from = symbol(&view.from_token);
    let to = symbol(&view.to_token);
    println!("  from: {} {}", field(&view.from_amount), from);
    println!("  to:   {} {}", field(&view.to_amount), to);
    if let Some(rate) = view.implied_rate {
        println!("  rate: 1 {} = {} {}", from, format_decimal(rate, 6), to);
    }
    if let Some(usd) = view.usd_amount {
        println!("  usd:  ${}", format_decimal(usd, 2));
    }
    match view.phase {
        Phase::Failed => {
            if let Some(err) = &view.error {
                println!("  error: {} (type 'dismiss' to clear)", err);
            }
        }
        Phase::Computing => println!("  computing..."),
        Phase::Idle if view.pending => println!("  pending..."),
        _ => {}
    }
}
