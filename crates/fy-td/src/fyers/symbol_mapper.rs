//! Bidirectional mapping between host instruments and broker symbol strings.
//!
//! | Kind   | Broker symbol                              | Example                    |
//! |--------|--------------------------------------------|----------------------------|
//! | Equity | `EXCH:TICKER-EQ`                           | `NSE:SBIN-EQ`              |
//! | Index  | `EXCH:TICKER-INDEX`                        | `NSE:NIFTY50-INDEX`        |
//! | Future | `EXCH:{UND}{YY}{MON}FUT`                   | `NSE:NIFTY24DECFUT`        |
//! | Option | `EXCH:{UND}{YY}{M}{DD}{STRIKE}{CE\|PE}`    | `NSE:NIFTY24D2623500CE`    |
//!
//! Option symbols use the broker's one-letter month code (see
//! [`MONTH_LETTERS`]), which is not the English initial for every month.
//!
//! Future symbols carry only a month, so parsing resolves the expiry to the
//! last Thursday of that month. This is a calendar convention, not data from
//! the symbol: a holiday-shifted expiry will not round-trip to the exact day.
//!
//! Both directions are cached for the lifetime of the mapper.

use ahash::AHashMap;
use chrono::{Datelike, NaiveDate};
use fy_core::time_util::last_thursday;
use fy_core::{FyError, Instrument, Market, OptionRight, SecurityKind};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::debug;

/// Broker option month codes, January first.
pub const MONTH_LETTERS: [char; 12] = ['J', 'F', 'M', 'A', 'Y', 'N', 'L', 'G', 'S', 'O', 'V', 'D'];

/// Future month codes, January first.
pub const MONTH_ABBREVS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

fn month_from_letter(c: char) -> Option<u32> {
    MONTH_LETTERS.iter().position(|&l| l == c).map(|i| i as u32 + 1)
}

fn month_from_abbrev(s: &str) -> Option<u32> {
    MONTH_ABBREVS.iter().position(|&m| m == s).map(|i| i as u32 + 1)
}

/// One row of the broker's symbol master, already parsed by the caller.
#[derive(Debug, Clone)]
pub struct SymbolMasterRow {
    /// Broker symbol (e.g. `NSE:NIFTY24DECFUT`).
    pub symbol: String,
    pub instrument: Instrument,
}

/// Thread-safe, caching symbol translator.
#[derive(Debug, Default)]
pub struct SymbolMapper {
    to_broker: RwLock<AHashMap<Instrument, String>>,
    to_instrument: RwLock<AHashMap<String, Instrument>>,
}

impl SymbolMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker symbol for a host instrument.
    pub fn to_broker_symbol(&self, instrument: &Instrument) -> Result<String, FyError> {
        if let Some(symbol) = self.to_broker.read().get(instrument) {
            return Ok(symbol.clone());
        }
        let symbol = format_symbol(instrument)?;
        self.to_broker
            .write()
            .insert(instrument.clone(), symbol.clone());
        Ok(symbol)
    }

    /// Host instrument for a broker symbol.
    ///
    /// `hint` overrides kind inference. `market`, when given, must agree with
    /// the symbol's exchange prefix.
    pub fn to_instrument(
        &self,
        symbol: &str,
        hint: Option<SecurityKind>,
        market: Option<Market>,
    ) -> Result<Instrument, FyError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(FyError::InvalidArgument("empty broker symbol".into()));
        }

        if let Some(cached) = self.to_instrument.read().get(symbol) {
            let kind_ok = hint.is_none_or(|k| k == cached.kind);
            let market_ok = market.is_none_or(|m| m == cached.market);
            if kind_ok && market_ok {
                return Ok(cached.clone());
            }
        }

        let instrument = parse_symbol(symbol, hint, market)?;
        debug!("[symbols] {symbol} -> {instrument}");
        self.to_instrument
            .write()
            .insert(symbol.to_string(), instrument.clone());
        Ok(instrument)
    }

    /// Seed both caches from symbol-master rows. Returns the number loaded.
    pub fn load_from_symbol_master<I>(&self, rows: I) -> usize
    where
        I: IntoIterator<Item = SymbolMasterRow>,
    {
        let mut to_broker = self.to_broker.write();
        let mut to_instrument = self.to_instrument.write();
        let mut n = 0;
        for row in rows {
            to_broker.insert(row.instrument.clone(), row.symbol.clone());
            to_instrument.insert(row.symbol, row.instrument);
            n += 1;
        }
        n
    }

    /// Number of cached instrument → symbol entries.
    pub fn len(&self) -> usize {
        self.to_broker.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_broker.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn format_symbol(instrument: &Instrument) -> Result<String, FyError> {
    if instrument.underlying.trim().is_empty() {
        return Err(FyError::InvalidArgument("instrument has no underlying".into()));
    }
    let exch = instrument.market.code();
    let und = &instrument.underlying;

    match instrument.kind {
        SecurityKind::Equity => Ok(format!("{exch}:{und}-EQ")),
        SecurityKind::Index => Ok(format!("{exch}:{und}-INDEX")),
        SecurityKind::Future => {
            let expiry = require(instrument.expiry, "future", "expiry")?;
            let mon = MONTH_ABBREVS[expiry.month0() as usize];
            Ok(format!("{exch}:{und}{:02}{mon}FUT", expiry.year() % 100))
        }
        SecurityKind::Option => {
            let expiry = require(instrument.expiry, "option", "expiry")?;
            let strike = require(instrument.strike, "option", "strike")?;
            let right = require(instrument.right, "option", "right")?;
            let letter = MONTH_LETTERS[expiry.month0() as usize];
            Ok(format!(
                "{exch}:{und}{:02}{letter}{:02}{}{}",
                expiry.year() % 100,
                expiry.day(),
                strike.normalize(),
                right.suffix()
            ))
        }
        other => Err(FyError::UnsupportedSecurityKind(other)),
    }
}

fn require<T>(value: Option<T>, kind: &str, field: &str) -> Result<T, FyError> {
    value.ok_or_else(|| FyError::InvalidArgument(format!("{kind} instrument has no {field}")))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn malformed(symbol: &str) -> FyError {
    FyError::MalformedSymbol(symbol.to_string())
}

/// Kind from the symbol text: `-EQ`/`-INDEX`, then `FUT`, then `CE`/`PE`.
fn infer_kind(ticker: &str) -> SecurityKind {
    if ticker.ends_with("-EQ") {
        SecurityKind::Equity
    } else if ticker.ends_with("-INDEX") {
        SecurityKind::Index
    } else if ticker.contains("FUT") {
        SecurityKind::Future
    } else if ticker.ends_with("CE") || ticker.ends_with("PE") {
        SecurityKind::Option
    } else {
        SecurityKind::Equity
    }
}

fn parse_symbol(
    symbol: &str,
    hint: Option<SecurityKind>,
    market: Option<Market>,
) -> Result<Instrument, FyError> {
    let (exch, ticker) = symbol.split_once(':').ok_or_else(|| malformed(symbol))?;
    let prefix_market = Market::from_code(exch).ok_or_else(|| malformed(symbol))?;
    if market.is_some_and(|m| m != prefix_market) || ticker.is_empty() {
        return Err(malformed(symbol));
    }

    let kind = hint.unwrap_or_else(|| infer_kind(ticker));
    let instrument = match kind {
        SecurityKind::Equity => {
            let und = ticker.strip_suffix("-EQ").unwrap_or(ticker);
            non_empty(und, symbol)?;
            Instrument::equity(und, prefix_market)
        }
        SecurityKind::Index => {
            let und = ticker.strip_suffix("-INDEX").ok_or_else(|| malformed(symbol))?;
            non_empty(und, symbol)?;
            Instrument::index(und, prefix_market)
        }
        SecurityKind::Future => parse_future(ticker, prefix_market).ok_or_else(|| malformed(symbol))?,
        SecurityKind::Option => parse_option(ticker, prefix_market).ok_or_else(|| malformed(symbol))?,
        other => return Err(FyError::UnsupportedSecurityKind(other)),
    };
    Ok(instrument)
}

fn non_empty(und: &str, symbol: &str) -> Result<(), FyError> {
    if und.is_empty() { Err(malformed(symbol)) } else { Ok(()) }
}

fn two_digits(s: &str) -> Option<u32> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// `{UND}{YY}{MON}FUT`
fn parse_future(ticker: &str, market: Market) -> Option<Instrument> {
    let body = ticker.strip_suffix("FUT")?;
    if !body.is_ascii() || body.len() < 6 {
        return None;
    }
    let (und, tail) = body.split_at(body.len() - 5);
    let yy = two_digits(&tail[..2])?;
    let month = month_from_abbrev(&tail[2..])?;
    let expiry = last_thursday(2000 + yy as i32, month)?;
    Some(Instrument::future(und, market, expiry))
}

/// `{UND}{YY}{M}{DD}{STRIKE}{CE|PE}`; the first position where the full
/// date pattern matches ends the underlying.
fn parse_option(ticker: &str, market: Market) -> Option<Instrument> {
    let (body, right) = if let Some(b) = ticker.strip_suffix("CE") {
        (b, OptionRight::Call)
    } else {
        (ticker.strip_suffix("PE")?, OptionRight::Put)
    };
    if !body.is_ascii() {
        return None;
    }

    for i in 1..body.len().saturating_sub(5) {
        let Some(yy) = two_digits(&body[i..i + 2]) else {
            continue;
        };
        let Some(month) = body[i + 2..].chars().next().and_then(month_from_letter) else {
            continue;
        };
        let Some(day) = two_digits(&body[i + 3..i + 5]) else {
            continue;
        };
        let Some(expiry) = NaiveDate::from_ymd_opt(2000 + yy as i32, month, day) else {
            continue;
        };
        let strike_text = &body[i + 5..];
        if !strike_text.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let Ok(strike) = strike_text.parse::<Decimal>() else {
            continue;
        };
        return Some(Instrument::option(&body[..i], market, expiry, strike, right));
    }
    None
}
