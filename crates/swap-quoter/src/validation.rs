//! User input checks that run before anything touches the network.

use crate::error::{QuoteError, Result};
use crate::types::Token;

pub const MIN_USD_AMOUNT: f64 = 0.01;
pub const MAX_USD_AMOUNT: f64 = 1_000_000.0;
pub const DEFAULT_USD_AMOUNT: f64 = 100.0;

/// Allowed range for a USD notional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotionalLimits {
    pub min: f64,
    pub max: f64,
}

impl Default for NotionalLimits {
    fn default() -> Self {
        Self { min: MIN_USD_AMOUNT, max: MAX_USD_AMOUNT }
    }
}

pub fn validate_usd_amount(amount: f64, limits: &NotionalLimits) -> Result<()> {
    if !amount.is_finite() {
        return Err(QuoteError::validation("Please enter a valid number"));
    }
    if amount <= 0.0 {
        return Err(QuoteError::validation("Amount must be greater than zero"));
    }
    if amount < limits.min {
        return Err(QuoteError::validation(format!("Amount must be at least ${}", limits.min)));
    }
    if amount > limits.max {
        return Err(QuoteError::validation(format!(
            "Amount cannot exceed ${}",
            group_thousands(limits.max)
        )));
    }
    Ok(())
}

pub fn validate_token_selection(from: Option<&Token>, to: Option<&Token>) -> Result<()> {
    let from = from.ok_or_else(|| QuoteError::validation("Please select a source token"))?;
    let to = to.ok_or_else(|| QuoteError::validation("Please select a target token"))?;
    if from.same_asset(to) {
        return Err(QuoteError::validation("Source and target tokens must be different"));
    }
    Ok(())
}

/// Strip everything but digits and keep only the first decimal point.
pub fn sanitize_numeric_input(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut seen_point = false;
    for c in value.chars() {
        match c {
            '0'..='9' => out.push(c),
            '.' if !seen_point => {
                seen_point = true;
                out.push(c);
            }
            _ => {}
        }
    }
    out
}

/// Parse an amount field. `None` unless the text is a finite number above zero.
pub fn parse_amount(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Amount as shown in the amount fields: fixed six decimals.
pub fn format_amount(value: f64) -> String {
    format!("{:.6}", value)
}

fn group_thousands(value: f64) -> String {
    let whole = format!("{:.0}", value.trunc());
    let (sign, digits) = whole.strip_prefix('-').map_or(("", whole.as_str()), |d| ("-", d));
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}{}", sign, grouped)
}
