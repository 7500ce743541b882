// Library entry point for swap-quoter

pub mod cache;
pub mod calculator;
pub mod config;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod session;
pub mod source;
pub mod tokens;
pub mod types;
pub mod utils;
pub mod validation;

pub use calculator::{QuoteProvider, SwapCalculator};
pub use config::AppConfig;
pub use error::{ErrorKind, QuoteError, Result};
pub use gateway::{GatewaySettings, PricingGateway};
pub use session::{Phase, QuoteSession, SessionSnapshot};
pub use source::{HttpPriceSource, PriceSource, StaticPriceSource};
pub use types::{PriceInfo, SwapQuote, Token};
