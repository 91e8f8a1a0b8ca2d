//! Broker REST and order-socket payloads.
//!
//! Every response is an envelope with `"s": "ok" | "error"`, a numeric
//! `code` and a `message`, plus endpoint-specific fields. Fields the adapter
//! does not need are ignored; the ones it reads default when absent so a
//! partial payload still deserializes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Error fields of the response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub s: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    /// Broker error classification (e.g. `TokenException`).
    #[serde(default)]
    pub error_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fy_id: String,
    #[serde(default)]
    pub email_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileResponse {
    pub data: Profile,
}

/// One line of the funds report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundLimit {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub equity_amount: f64,
    #[serde(default)]
    pub commodity_amount: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FundsResponse {
    #[serde(default)]
    pub fund_limit: Vec<FundLimit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRow {
    pub symbol: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub cost_price: f64,
    #[serde(default)]
    pub ltp: f64,
    #[serde(default)]
    pub pl: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HoldingsResponse {
    #[serde(default)]
    pub holdings: Vec<HoldingRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRow {
    pub symbol: String,
    #[serde(default)]
    pub net_qty: f64,
    #[serde(default)]
    pub net_avg: f64,
    #[serde(default)]
    pub ltp: f64,
    #[serde(default)]
    pub pl: f64,
    #[serde(default)]
    pub product_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PositionsResponse {
    #[serde(default)]
    pub net_positions: Vec<PositionRow>,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// `POST /orders/sync` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub qty: i64,
    /// 1 limit, 2 market, 3 SL-M, 4 SL-L.
    #[serde(rename = "type")]
    pub order_type: i32,
    /// 1 buy, -1 sell.
    pub side: i32,
    pub product_type: String,
    pub limit_price: f64,
    pub stop_price: f64,
    pub validity: String,
    pub disclosed_qty: i64,
    pub offline_order: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_tag: Option<String>,
}

/// `PATCH /orders/sync` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyOrderRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub order_type: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
}

/// `DELETE /orders/sync` body.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderRequest {
    pub id: String,
}

/// Response to place / modify / cancel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderActionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
}

/// One order, as reported by the order book and pushed on the order socket.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRow {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub qty: f64,
    /// Cumulative filled quantity.
    #[serde(default)]
    pub filled_qty: f64,
    #[serde(default)]
    pub limit_price: f64,
    #[serde(default)]
    pub stop_price: f64,
    #[serde(default, rename = "type")]
    pub order_type: i32,
    #[serde(default)]
    pub side: i32,
    /// Broker status code (see `OrderStatus::from_wire`).
    #[serde(default)]
    pub status: i32,
    /// Average traded price.
    #[serde(default)]
    pub traded_price: f64,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub order_tag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderBookResponse {
    #[serde(default)]
    pub order_book: Vec<OrderRow>,
}

/// One execution.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRow {
    #[serde(default)]
    pub order_number: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub traded_qty: f64,
    #[serde(default)]
    pub trade_price: f64,
    #[serde(default)]
    pub side: i32,
    #[serde(default)]
    pub trade_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TradeBookResponse {
    #[serde(default)]
    pub trade_book: Vec<TradeRow>,
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Query for `GET /data/history`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRequest {
    pub symbol: String,
    /// Broker resolution code: `1`, `60`, `D`.
    pub resolution: String,
    /// Unix seconds, inclusive.
    pub range_from: i64,
    /// Unix seconds, inclusive.
    pub range_to: i64,
}

/// `[time_s, open, high, low, close, volume]`
pub type Candle = [f64; 6];

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    #[serde(default)]
    pub candles: Vec<Candle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteValues {
    #[serde(default)]
    pub lp: f64,
    #[serde(default)]
    pub open_price: f64,
    #[serde(default)]
    pub high_price: f64,
    #[serde(default)]
    pub low_price: f64,
    #[serde(default)]
    pub prev_close_price: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub ask: f64,
    /// Exchange time, Unix seconds.
    #[serde(default)]
    pub tt: i64,
}

/// One symbol of a quotes / OHLC / LTP response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteEntry {
    /// Broker symbol.
    pub n: String,
    #[serde(default)]
    pub v: QuoteValues,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuotesResponse {
    #[serde(default)]
    pub d: Vec<QuoteEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepthLevel {
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub ord: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Depth {
    #[serde(default)]
    pub bids: Vec<DepthLevel>,
    #[serde(default, rename = "ask")]
    pub asks: Vec<DepthLevel>,
    #[serde(default)]
    pub ltp: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DepthResponse {
    #[serde(default)]
    pub d: HashMap<String, Depth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_request_wire_names() {
        let req = PlaceOrderRequest {
            symbol: "NSE:SBIN-EQ".into(),
            qty: 10,
            order_type: 1,
            side: -1,
            product_type: "CNC".into(),
            limit_price: 812.5,
            stop_price: 0.0,
            validity: "DAY".into(),
            disclosed_qty: 0,
            offline_order: false,
            order_tag: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["type"], 1);
        assert_eq!(v["side"], -1);
        assert_eq!(v["productType"], "CNC");
        assert_eq!(v["limitPrice"], 812.5);
        assert!(v.get("orderTag").is_none());
    }

    #[test]
    fn order_row_tolerates_missing_fields() {
        let row: OrderRow = serde_json::from_str(
            r#"{"id":"2401","symbol":"NSE:SBIN-EQ","qty":100,"filledQty":30,"status":6,"type":2,"side":1}"#,
        )
        .unwrap();
        assert_eq!(row.id, "2401");
        assert_eq!(row.filled_qty, 30.0);
        assert_eq!(row.order_type, 2);
        assert_eq!(row.traded_price, 0.0);
    }

    #[test]
    fn candles_are_fixed_arrays() {
        let resp: HistoryResponse =
            serde_json::from_str(r#"{"s":"ok","candles":[[1700000000,1,2,0.5,1.5,1000]]}"#).unwrap();
        assert_eq!(resp.candles[0][0], 1_700_000_000.0);
        assert_eq!(resp.candles[0][5], 1000.0);
    }
}
