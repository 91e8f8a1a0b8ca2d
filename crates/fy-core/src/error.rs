//! Typed error definitions for the Fyers brokerage adapter.
//!
//! [`FyError`] covers three families of failures:
//!
//! - broker-reported REST errors, classified from the broker's error-type
//!   string (see [`FyError::from_broker`]),
//! - adapter-local errors raised by the symbol translator and history
//!   downloader,
//! - plumbing errors (config, websocket, parsing, timeouts).
//!
//! All variants implement `std::error::Error` via `thiserror`, so they compose
//! with `anyhow::Result` in the non-typed parts of the code base.

use thiserror::Error;

use crate::types::SecurityKind;

/// Domain-specific errors for the brokerage adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FyError {
    /// Expired or invalid credential. Triggers the session-expiry hook.
    #[error("token error: {0}")]
    Token(String),

    #[error("permission error: {0}")]
    Permission(String),

    /// The broker rejected an order action.
    #[error("order error: {0}")]
    Order(String),

    /// Malformed request parameters.
    #[error("input error: {0}")]
    Input(String),

    /// Empty or unparseable response.
    #[error("data error: {0}")]
    Data(String),

    /// Transport-level failure (retries exhausted).
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 429 after all retries.
    #[error("rate limit error: {0}")]
    RateLimit(String),

    /// Market closed or segment unavailable.
    #[error("market error: {0}")]
    Market(String),

    #[error("general error: {0}")]
    General(String),

    /// Broker symbol string does not match the expected grammar.
    #[error("malformed symbol: {0}")]
    MalformedSymbol(String),

    #[error("unsupported security kind: {0:?}")]
    UnsupportedSecurityKind(SecurityKind),

    /// Null/empty argument passed to a translator or facade call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported resolution: {0}")]
    UnsupportedResolution(String),

    #[error("unsupported security type: {0:?}")]
    UnsupportedSecurityType(SecurityKind),

    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Market data or order event parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl FyError {
    /// Map the broker's error classification string onto the taxonomy.
    ///
    /// Unknown classifications become [`FyError::General`].
    pub fn from_broker(error_type: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match error_type {
            "TokenException" => Self::Token(message),
            "PermissionException" => Self::Permission(message),
            "OrderException" => Self::Order(message),
            "InputException" => Self::Input(message),
            "DataException" => Self::Data(message),
            "NetworkException" => Self::Network(message),
            "MarketException" => Self::Market(message),
            _ => Self::General(message),
        }
    }

    /// Fallback classification when the error body carries no error type.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Token(message),
            403 => Self::Permission(message),
            400 | 404 | 422 => Self::Input(message),
            429 => Self::RateLimit(message),
            500..=599 => Self::Network(message),
            _ => Self::General(message),
        }
    }

    /// Whether this error means the session credential is no longer usable.
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::Token(_) | Self::Permission(_))
    }
}
