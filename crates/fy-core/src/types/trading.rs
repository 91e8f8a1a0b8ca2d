//! Trading-related data structures: orders, order events, holdings.
//!
//! These types flow between the host and the order gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{Direction, OrderStatus, OrderType, ProductType};
use super::instrument::Instrument;

// ---------------------------------------------------------------------------
// Input order (host → gateway)
// ---------------------------------------------------------------------------

/// An order request sent from the host to the order gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputOrder {
    /// Host-assigned order ID (unique per session).
    pub host_order_id: u64,
    pub instrument: Instrument,
    pub direction: Direction,
    pub order_type: OrderType,
    pub product_type: ProductType,
    /// Absolute quantity.
    pub quantity: f64,
    /// Limit price (limit / stop-limit orders).
    pub limit_price: Option<f64>,
    /// Trigger price (stop orders).
    pub stop_price: Option<f64>,
    /// Free-form tag forwarded to the broker.
    pub tag: Option<String>,
}

// ---------------------------------------------------------------------------
// Order event (gateway → host)
// ---------------------------------------------------------------------------

/// A host-visible order lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub host_order_id: u64,
    /// Broker order ID, when one has been assigned.
    pub broker_order_id: Option<String>,
    pub status: OrderStatus,
    /// Signed fill quantity of this event (positive buy, negative sell).
    pub fill_quantity: f64,
    pub fill_price: f64,
    pub message: String,
    pub time: DateTime<Utc>,
}

impl OrderEvent {
    /// A non-fill status change.
    pub fn status(
        host_order_id: u64,
        broker_order_id: Option<String>,
        status: OrderStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            host_order_id,
            broker_order_id,
            status,
            fill_quantity: 0.0,
            fill_price: 0.0,
            message: message.into(),
            time: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Open order snapshot
// ---------------------------------------------------------------------------

/// An open order as reported by the broker order book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub broker_order_id: String,
    /// Host order ID if the order was placed through this session.
    pub host_order_id: Option<u64>,
    pub instrument: Instrument,
    pub direction: Direction,
    pub order_type: OrderType,
    pub quantity: f64,
    pub filled_quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub status: OrderStatus,
}

// ---------------------------------------------------------------------------
// Holding / cash
// ---------------------------------------------------------------------------

/// An account holding or net position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub instrument: Instrument,
    /// Signed quantity (positive long, negative short).
    pub quantity: f64,
    pub average_price: f64,
    pub market_price: f64,
    pub unrealized_pnl: f64,
}

/// Cash balance in one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashAmount {
    pub currency: String,
    pub amount: f64,
}
