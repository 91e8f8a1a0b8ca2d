//! Historical bars, fetched in broker-sized chunks.
//!
//! The broker caps the span of one history request: 100 days for minute and
//! hour bars, 366 days for daily bars. Longer requests are split into
//! consecutive inclusive ranges, fetched one after another and concatenated.
//! Bars outside the requested window or not after the previous bar are
//! dropped so that chunk boundaries never duplicate a bar.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fy_core::{Bar, FyError, Instrument, Resolution};
use fy_td::fyers::models::{Candle, HistoryRequest as BrokerHistoryRequest};
use fy_td::{RestClient, SymbolMapper};
use tracing::{debug, info};

const SECS_PER_DAY: i64 = 86_400;

/// Kind of data a history request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    TradeBar,
    QuoteBar,
    Tick,
}

/// A host history request.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRequest {
    pub instrument: Instrument,
    pub resolution: Resolution,
    pub data_type: DataType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Broker resolution code and maximum chunk span in days.
fn resolution_params(resolution: Resolution) -> Option<(&'static str, i64)> {
    match resolution {
        Resolution::Minute => Some(("1", 100)),
        Resolution::Hour => Some(("60", 100)),
        Resolution::Daily => Some(("D", 366)),
        Resolution::Tick | Resolution::Second => None,
    }
}

/// Reject requests the broker cannot serve.
pub fn check_supported(req: &HistoryRequest) -> Result<(), FyError> {
    if resolution_params(req.resolution).is_none() {
        return Err(FyError::UnsupportedResolution(req.resolution.to_string()));
    }
    if !req.instrument.kind.is_supported() {
        return Err(FyError::UnsupportedSecurityType(req.instrument.kind));
    }
    if req.data_type != DataType::TradeBar {
        return Err(FyError::UnsupportedDataType(format!("{:?}", req.data_type)));
    }
    Ok(())
}

/// Split `[from, to]` (Unix seconds, inclusive) into spans of at most
/// `max_days` days.
pub fn chunk_ranges(from: i64, to: i64, max_days: i64) -> Vec<(i64, i64)> {
    let span = max_days * SECS_PER_DAY;
    let mut out = Vec::new();
    let mut start = from;
    while start <= to {
        let end = (start + span - 1).min(to);
        out.push((start, end));
        start = end + 1;
    }
    out
}

fn candle_to_bar(candle: &Candle) -> Option<Bar> {
    let [time, open, high, low, close, volume] = *candle;
    Some(Bar {
        time: DateTime::from_timestamp(time as i64, 0)?,
        open,
        high,
        low,
        close,
        volume,
    })
}

pub struct HistoryDownloader {
    rest: Arc<RestClient>,
    symbols: Arc<SymbolMapper>,
}

impl HistoryDownloader {
    pub fn new(rest: Arc<RestClient>, symbols: Arc<SymbolMapper>) -> Self {
        Self { rest, symbols }
    }

    /// Fetch all bars of the request. `Ok(None)` when the request is not
    /// one the broker serves (see [`check_supported`]).
    pub async fn download(&self, req: &HistoryRequest) -> Result<Option<Vec<Bar>>, FyError> {
        if check_supported(req).is_err() {
            return Ok(None);
        }
        let Some((code, max_days)) = resolution_params(req.resolution) else {
            return Ok(None);
        };
        let symbol = self.symbols.to_broker_symbol(&req.instrument)?;

        let from = req.start.timestamp();
        let to = req.end.timestamp();
        let mut bars: Vec<Bar> = Vec::new();
        if from > to {
            return Ok(Some(bars));
        }

        let chunks = chunk_ranges(from, to, max_days);
        debug!("[fyers-rest] history {symbol} {code}: {} chunk(s)", chunks.len());
        for (range_from, range_to) in chunks {
            let candles = self
                .rest
                .history(&BrokerHistoryRequest {
                    symbol: symbol.clone(),
                    resolution: code.to_string(),
                    range_from,
                    range_to,
                })
                .await?;
            for bar in candles.iter().filter_map(candle_to_bar) {
                if bar.time < req.start || bar.time > req.end {
                    continue;
                }
                if bars.last().is_some_and(|last| bar.time <= last.time) {
                    continue;
                }
                bars.push(bar);
            }
        }
        info!("[fyers-rest] history {symbol} {code}: {} bar(s)", bars.len());
        Ok(Some(bars))
    }
}
