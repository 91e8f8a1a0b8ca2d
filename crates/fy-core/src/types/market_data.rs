//! Market data structures delivered to the host.
//!
//! # Timestamp convention
//!
//! Tick and quote timestamps are **milliseconds since Unix epoch**. The broker
//! sends seconds; the market-data decoder multiplies by 1000. `local_time_ms`
//! is stamped on receipt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tick (last trade + session OHLC)
// ---------------------------------------------------------------------------

/// Last-traded-price update for one broker symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Broker symbol (e.g. `NSE:SBIN-EQ`).
    pub symbol: String,
    pub last_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub exchange_time_ms: u64,
    pub local_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Quote (top of book)
// ---------------------------------------------------------------------------

/// Best bid / best ask for one broker symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: u64,
    pub ask_size: u64,
    pub exchange_time_ms: u64,
    pub local_time_ms: u64,
}

// ---------------------------------------------------------------------------
// MarketDataMsg: tagged union for channel passing
// ---------------------------------------------------------------------------

/// A tagged union of all streamed market-data message types.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketDataMsg {
    Tick(Tick),
    Quote(Quote),
}

impl MarketDataMsg {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Tick(t) => &t.symbol,
            Self::Quote(q) => &q.symbol,
        }
    }
}

// ---------------------------------------------------------------------------
// Bar (history)
// ---------------------------------------------------------------------------

/// One OHLCV bar returned by the history downloader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

// ---------------------------------------------------------------------------
// Display impls
// ---------------------------------------------------------------------------

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tick({} ltp={:.2} o={:.2} h={:.2} l={:.2} c={:.2} v={})",
            self.symbol, self.last_price, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

impl std::fmt::Display for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Quote({} bid={:.2}x{} ask={:.2}x{})",
            self.symbol, self.bid_price, self.bid_size, self.ask_price, self.ask_size
        )
    }
}
