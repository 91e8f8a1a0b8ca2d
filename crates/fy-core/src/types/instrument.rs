//! Canonical, broker-agnostic instrument identity.
//!
//! An [`Instrument`] is owned by the host and is immutable once built. The
//! symbol translator reads it to derive broker symbols and builds new values
//! when parsing broker symbols back.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{Market, OptionRight, SecurityKind};

/// Host instrument identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Underlying ticker (e.g. `SBIN`, `NIFTY`).
    pub underlying: String,
    pub kind: SecurityKind,
    pub market: Market,
    /// Expiry date (futures and options only).
    pub expiry: Option<NaiveDate>,
    /// Strike price (options only).
    pub strike: Option<Decimal>,
    /// Call or put (options only).
    pub right: Option<OptionRight>,
}

impl Instrument {
    pub fn equity(underlying: impl Into<String>, market: Market) -> Self {
        Self::plain(underlying, SecurityKind::Equity, market)
    }

    pub fn index(underlying: impl Into<String>, market: Market) -> Self {
        Self::plain(underlying, SecurityKind::Index, market)
    }

    pub fn future(underlying: impl Into<String>, market: Market, expiry: NaiveDate) -> Self {
        Self {
            underlying: underlying.into(),
            kind: SecurityKind::Future,
            market,
            expiry: Some(expiry),
            strike: None,
            right: None,
        }
    }

    pub fn option(
        underlying: impl Into<String>,
        market: Market,
        expiry: NaiveDate,
        strike: Decimal,
        right: OptionRight,
    ) -> Self {
        Self {
            underlying: underlying.into(),
            kind: SecurityKind::Option,
            market,
            expiry: Some(expiry),
            strike: Some(strike),
            right: Some(right),
        }
    }

    /// Build an identity of any kind without derivative fields.
    pub fn plain(underlying: impl Into<String>, kind: SecurityKind, market: Market) -> Self {
        Self {
            underlying: underlying.into(),
            kind,
            market,
            expiry: None,
            strike: None,
            right: None,
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}({:?}", self.market, self.underlying, self.kind)?;
        if let Some(expiry) = self.expiry {
            write!(f, " {expiry}")?;
        }
        if let (Some(strike), Some(right)) = (self.strike, self.right) {
            write!(f, " {strike}{}", right.suffix())?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn display_includes_derivative_fields() {
        let expiry = NaiveDate::from_ymd_opt(2024, 12, 26).unwrap();
        let opt = Instrument::option("NIFTY", Market::Nse, expiry, dec!(23500), OptionRight::Put);
        assert_eq!(opt.to_string(), "NSE:NIFTY(Option 2024-12-26 23500PE)");
        assert_eq!(Instrument::equity("SBIN", Market::Nse).to_string(), "NSE:SBIN(Equity)");
    }
}
