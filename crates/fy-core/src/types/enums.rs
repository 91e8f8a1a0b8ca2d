//! Enumerations used throughout the brokerage adapter.
//!
//! Host-side enums (security kind, direction, order status) are broker
//! agnostic. Broker wire codes live next to the enums as `from_wire` /
//! `wire_code` helpers so that the REST and WebSocket layers share one
//! mapping.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market / exchange segment
// ---------------------------------------------------------------------------

/// Exchange segment an instrument trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    #[default]
    Nse,
    Bse,
    Mcx,
}

impl Market {
    /// Exchange prefix used in broker symbols (`NSE`, `BSE`, `MCX`).
    pub fn code(self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
            Self::Mcx => "MCX",
        }
    }

    /// Parse an exchange prefix.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NSE" => Some(Self::Nse),
            "BSE" => Some(Self::Bse),
            "MCX" => Some(Self::Mcx),
            _ => None,
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// Security kind
// ---------------------------------------------------------------------------

/// Host security kind.
///
/// The broker only lists the first four; the remaining host kinds exist so
/// that requests for them can be rejected with a typed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityKind {
    Equity,
    Index,
    Future,
    Option,
    Forex,
    Crypto,
    Cfd,
}

impl SecurityKind {
    /// Whether the broker lists instruments of this kind.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Equity | Self::Index | Self::Future | Self::Option)
    }
}

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Broker suffix (`CE` / `PE`).
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }
}

// ---------------------------------------------------------------------------
// Order / trading enums
// ---------------------------------------------------------------------------

/// Buy or sell direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Broker side code: `1` buy, `-1` sell.
    pub fn wire_code(self) -> i32 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }

    pub fn from_wire(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Buy),
            -1 => Some(Self::Sell),
            _ => None,
        }
    }

    /// `+1.0` for buys, `-1.0` for sells.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

/// Host order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    StopMarket,
    StopLimit,
}

impl OrderType {
    /// Broker order type code: 1 limit, 2 market, 3 stop (SL-M), 4 stop-limit (SL-L).
    pub fn wire_code(self) -> i32 {
        match self {
            Self::Limit => 1,
            Self::Market => 2,
            Self::StopMarket => 3,
            Self::StopLimit => 4,
        }
    }

    pub fn from_wire(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Limit),
            2 => Some(Self::Market),
            3 => Some(Self::StopMarket),
            4 => Some(Self::StopLimit),
            _ => None,
        }
    }
}

/// Broker product type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProductType {
    #[default]
    Intraday,
    Cnc,
    Margin,
}

impl ProductType {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Intraday => "INTRADAY",
            Self::Cnc => "CNC",
            Self::Margin => "MARGIN",
        }
    }
}

/// Host-visible order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Submitted,
    PartiallyFilled,
    Filled,
    CancelPending,
    Canceled,
    UpdateSubmitted,
    Invalid,
}

impl OrderStatus {
    /// Map a broker status code.
    ///
    /// Broker codes: 1 cancelled, 2 traded, 4 transit, 5 rejected,
    /// 6 pending, 7 expired.
    pub fn from_wire(code: i32) -> Option<Self> {
        match code {
            1 | 7 => Some(Self::Canceled),
            2 => Some(Self::Filled),
            4 | 6 => Some(Self::Submitted),
            5 => Some(Self::Invalid),
            _ => None,
        }
    }

    /// Terminal statuses: no further broker events are expected or trusted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Invalid)
    }

    /// Statuses from which an order may still be modified or cancelled.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            Self::New | Self::Submitted | Self::PartiallyFilled | Self::UpdateSubmitted
        )
    }
}

// ---------------------------------------------------------------------------
// History resolution
// ---------------------------------------------------------------------------

/// Bar resolution for history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Tick,
    Second,
    Minute,
    Hour,
    Daily,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
