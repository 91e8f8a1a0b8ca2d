//! Order-event channel: the broker's JSON order/trade/position push socket.
//!
//! The credential travels as an `Authorization: {client_id}:{access_token}`
//! handshake header, so a completed transport open is already authenticated:
//!
//! ```text
//! Disconnected → Connecting → Open → Disconnected
//!                               ↘ Closing (deliberate)
//! ```
//!
//! On open the channel subscribes to orders, trades and positions. Each
//! message is routed by its `T` / `type` field (or, for untyped pushes, by
//! its payload key) to an [`OrderEventSink`]. The channel itself keeps no
//! order state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use fy_core::config::OrderEventConfig;
use fy_core::time_util;
use fy_core::ws::{
    ChannelState, Outbound, PingPayload, StateCell, WsConnConfig, WsConnection, WsHandler,
};
use fy_core::FyError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::{OrderRow, PositionRow, TradeRow};

const LABEL: &str = "fyers-orders";

/// Subscription sent right after the socket opens.
pub const SUBSCRIBE_MSG: &str = r#"{"T":"SUB_ORD","SLIST":["orders","trades","positions"],"SUB_T":1}"#;

/// Receiver of decoded order-socket pushes.
///
/// Called from the socket task; implementations must not block.
pub trait OrderEventSink: Send + Sync + 'static {
    fn on_order(&self, order: OrderRow);

    fn on_trade(&self, trade: TradeRow);

    fn on_position(&self, _position: PositionRow) {}

    /// The broker pushed an error message.
    fn on_broker_error(&self, _message: &str) {}
}

/// Decoded message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Order,
    Trade,
    Position,
    Error,
    ConnectionAck,
}

impl Kind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "order" | "orders" | "ord" => Some(Self::Order),
            "trade" | "trades" | "tra" => Some(Self::Trade),
            "position" | "positions" | "pos" => Some(Self::Position),
            "error" | "err" => Some(Self::Error),
            "cn" | "ack" | "connect" | "connection" | "sub_ord" | "sub_ord_ack" => {
                Some(Self::ConnectionAck)
            }
            _ => None,
        }
    }

    /// Key holding the payload of an untyped push.
    fn payload_key(self) -> &'static str {
        match self {
            Self::Order => "orders",
            Self::Trade => "trades",
            Self::Position => "positions",
            Self::Error | Self::ConnectionAck => "d",
        }
    }
}

struct Shared {
    state: StateCell,
    sink: Arc<dyn OrderEventSink>,
    last_message_ms: AtomicU64,
}

impl Shared {
    fn dispatch(&self, text: &str) {
        let text = text.trim();
        if text.eq_ignore_ascii_case("pong") {
            return;
        }
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("[{LABEL}] unparseable message ({e}): {text}");
                return;
            }
        };

        let tag = value
            .get("T")
            .or_else(|| value.get("type"))
            .and_then(Value::as_str);
        let kind = match tag {
            Some(tag) => Kind::from_tag(tag),
            None => [Kind::Order, Kind::Trade, Kind::Position]
                .into_iter()
                .find(|k| value.get(k.payload_key()).is_some()),
        };
        let Some(kind) = kind else {
            debug!("[{LABEL}] unknown message type {tag:?}: {text}");
            return;
        };

        let payload = value
            .get("d")
            .or_else(|| value.get("data"))
            .or_else(|| value.get(kind.payload_key()));

        match kind {
            Kind::Order => {
                for row in rows::<OrderRow>(payload) {
                    self.sink.on_order(row);
                }
            }
            Kind::Trade => {
                for row in rows::<TradeRow>(payload) {
                    self.sink.on_trade(row);
                }
            }
            Kind::Position => {
                for row in rows::<PositionRow>(payload) {
                    self.sink.on_position(row);
                }
            }
            Kind::Error => {
                let message = value
                    .get("message")
                    .or_else(|| value.get("msg"))
                    .and_then(Value::as_str)
                    .unwrap_or(text);
                warn!("[{LABEL}] broker error: {message}");
                self.sink.on_broker_error(message);
            }
            Kind::ConnectionAck => info!("[{LABEL}] subscription acknowledged"),
        }
    }
}

/// Payload as a list of rows; a single object is a list of one.
fn rows<T: DeserializeOwned>(payload: Option<&Value>) -> Vec<T> {
    let items: Vec<&Value> = match payload {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::Object(_)) => vec![v],
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("[{LABEL}] dropping malformed row: {e}");
                None
            }
        })
        .collect()
}

impl WsHandler for Shared {
    fn on_text(&self, text: &str) {
        self.last_message_ms
            .store(time_util::now_ms(), Ordering::Relaxed);
        self.dispatch(text);
    }

    fn on_close(&self, reason: &str) {
        if self.state.mark_lost() {
            warn!("[{LABEL}] connection lost: {reason}");
        }
    }
}

/// The broker order-event feed.
pub struct OrderEventChannel {
    config: OrderEventConfig,
    shared: Arc<Shared>,
    conn: tokio::sync::Mutex<WsConnection>,
}

impl OrderEventChannel {
    /// `auth_header` is the `{client_id}:{access_token}` credential.
    pub fn new(config: OrderEventConfig, auth_header: &str, sink: Arc<dyn OrderEventSink>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), auth_header.to_string());
        let ws_config = WsConnConfig {
            url: config.ws_url.clone(),
            extra_headers: headers,
            ping_interval: Some(config.ping_interval()),
            ping_payload: Some(PingPayload::Text("ping".into())),
            label: LABEL.into(),
        };
        Self {
            config,
            shared: Arc::new(Shared {
                state: StateCell::default(),
                sink,
                last_message_ms: AtomicU64::new(0),
            }),
            conn: tokio::sync::Mutex::new(WsConnection::new(ws_config)),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Open the socket and subscribe. A no-op when already open.
    pub async fn connect(&self) -> Result<(), FyError> {
        let mut conn = self.conn.lock().await;
        if self.is_open() && conn.is_running() {
            return Ok(());
        }

        conn.close().await;
        self.shared.state.set(ChannelState::Connecting);
        let handler: Arc<dyn WsHandler> = self.shared.clone();
        let sender = match conn.open(handler, self.config.connect_timeout()).await {
            Ok(sender) => sender,
            Err(e) => {
                self.shared.state.set(ChannelState::Disconnected);
                warn!("[{LABEL}] connect failed: {e}");
                return Err(e);
            }
        };

        if let Err(e) = sender.send(Outbound::Text(SUBSCRIBE_MSG.to_string())).await {
            conn.close().await;
            self.shared.state.set(ChannelState::Disconnected);
            return Err(FyError::WebSocket(format!("subscribe: {e}")));
        }

        if !self
            .shared
            .state
            .transition(ChannelState::Connecting, ChannelState::Open)
        {
            conn.close().await;
            self.shared.state.set(ChannelState::Disconnected);
            warn!("[{LABEL}] connection lost while subscribing");
            return Err(FyError::WebSocket("connection lost while subscribing".into()));
        }
        info!("[{LABEL}] connected and subscribed");
        Ok(())
    }

    /// Deliberately close the socket. Idempotent.
    pub async fn disconnect(&self) {
        let mut conn = self.conn.lock().await;
        self.shared.state.set(ChannelState::Closing);
        conn.close().await;
        self.shared.state.set(ChannelState::Disconnected);
        info!("[{LABEL}] disconnected");
    }

    /// Time since the last inbound message, `None` before the first one.
    pub fn last_message_age(&self) -> Option<Duration> {
        match self.shared.last_message_ms.load(Ordering::Relaxed) {
            0 => None,
            last => Some(Duration::from_millis(
                time_util::now_ms().saturating_sub(last),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        orders: Mutex<Vec<OrderRow>>,
        trades: Mutex<Vec<TradeRow>>,
        positions: Mutex<Vec<PositionRow>>,
        errors: Mutex<Vec<String>>,
    }

    impl OrderEventSink for Recorder {
        fn on_order(&self, order: OrderRow) {
            self.orders.lock().push(order);
        }
        fn on_trade(&self, trade: TradeRow) {
            self.trades.lock().push(trade);
        }
        fn on_position(&self, position: PositionRow) {
            self.positions.lock().push(position);
        }
        fn on_broker_error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }
    }

    fn shared() -> (Shared, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            Shared {
                state: StateCell::default(),
                sink: recorder.clone(),
                last_message_ms: AtomicU64::new(0),
            },
            recorder,
        )
    }

    #[test]
    fn routes_typed_messages() {
        let (s, rec) = shared();
        s.dispatch(r#"{"T":"order","d":{"id":"2401","filledQty":10,"qty":20,"status":6}}"#);
        s.dispatch(r#"{"type":"trades","d":[{"orderNumber":"2401","tradedQty":10,"tradePrice":101.5}]}"#);
        s.dispatch(r#"{"T":"position","d":{"symbol":"NSE:SBIN-EQ","netQty":10}}"#);
        s.dispatch(r#"{"T":"error","message":"session expired"}"#);

        assert_eq!(rec.orders.lock()[0].filled_qty, 10.0);
        assert_eq!(rec.trades.lock()[0].trade_price, 101.5);
        assert_eq!(rec.positions.lock()[0].net_qty, 10.0);
        assert_eq!(rec.errors.lock()[0], "session expired");
    }

    #[test]
    fn routes_untyped_pushes_by_payload_key() {
        let (s, rec) = shared();
        s.dispatch(r#"{"s":"ok","orders":{"id":"77","status":2,"qty":5,"filledQty":5}}"#);
        assert_eq!(rec.orders.lock().len(), 1);
        assert_eq!(rec.orders.lock()[0].id, "77");
    }

    #[test]
    fn ignores_unknown_and_malformed() {
        let (s, rec) = shared();
        s.dispatch("pong");
        s.dispatch("not json");
        s.dispatch(r#"{"T":"heartbeat"}"#);
        s.dispatch(r#"{"T":"cn","s":"ok"}"#);
        // Row without the required id is dropped, valid sibling kept.
        s.dispatch(r#"{"T":"orders","d":[{"status":6},{"id":"9","status":6}]}"#);
        let orders = rec.orders.lock();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, "9");
        assert!(rec.trades.lock().is_empty());
    }

    #[test]
    fn transport_close_respects_deliberate_teardown() {
        let (s, _rec) = shared();
        s.state.set(ChannelState::Closing);
        s.on_close("stream ended");
        assert_eq!(s.state.get(), ChannelState::Closing);

        s.state.set(ChannelState::Open);
        s.on_close("stream ended");
        assert_eq!(s.state.get(), ChannelState::Disconnected);
        assert!(!s.state.transition(ChannelState::Connecting, ChannelState::Open));
    }

    #[test]
    fn subscribe_message_shape() {
        let v: Value = serde_json::from_str(SUBSCRIBE_MSG).unwrap();
        assert_eq!(v["T"], "SUB_ORD");
        assert_eq!(v["SLIST"].as_array().unwrap().len(), 3);
        assert_eq!(v["SUB_T"], 1);
    }
}
