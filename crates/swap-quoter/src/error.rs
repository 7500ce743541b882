//! Error taxonomy shared by the gateway, calculator and session.

use serde_json::Value;
use thiserror::Error;

pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Unified error type for the swap quoter.
///
/// Every variant carries a human-readable message. Upstream-facing variants
/// also carry an optional machine code and the raw detail payload, so the
/// presentation layer can show the message and keep the rest for debugging.
#[derive(Debug, Clone, Error)]
pub enum QuoteError {
    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Network {
        message: String,
        code: Option<String>,
        details: Option<Value>,
    },

    #[error("{message}")]
    Upstream {
        message: String,
        code: Option<String>,
        details: Option<Value>,
    },

    #[error("{message}")]
    Resolution { message: String },

    #[error("{message}")]
    Unknown {
        message: String,
        code: Option<String>,
        details: Option<Value>,
    },

    #[error("config error: {0}")]
    Config(String),
}

/// Discriminant of [`QuoteError`], handy for assertions and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Network,
    Upstream,
    Resolution,
    Unknown,
    Config,
}

impl QuoteError {
    pub fn validation(message: impl Into<String>) -> Self {
        QuoteError::Validation { message: message.into() }
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        QuoteError::Resolution { message: message.into() }
    }

    pub fn network(details: Option<Value>) -> Self {
        QuoteError::Network {
            message: "Network error - please check your connection".to_string(),
            code: Some(NETWORK_ERROR_CODE.to_string()),
            details,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        QuoteError::Unknown {
            message: message.into(),
            code: Some(UNKNOWN_ERROR_CODE.to_string()),
            details: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QuoteError::Validation { .. } => ErrorKind::Validation,
            QuoteError::Network { .. } => ErrorKind::Network,
            QuoteError::Upstream { .. } => ErrorKind::Upstream,
            QuoteError::Resolution { .. } => ErrorKind::Resolution,
            QuoteError::Unknown { .. } => ErrorKind::Unknown,
            QuoteError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            QuoteError::Validation { message }
            | QuoteError::Network { message, .. }
            | QuoteError::Upstream { message, .. }
            | QuoteError::Resolution { message }
            | QuoteError::Unknown { message, .. } => message,
            QuoteError::Config(message) => message,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            QuoteError::Network { code, .. }
            | QuoteError::Upstream { code, .. }
            | QuoteError::Unknown { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            QuoteError::Network { details, .. }
            | QuoteError::Upstream { details, .. }
            | QuoteError::Unknown { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, QuoteError>;
