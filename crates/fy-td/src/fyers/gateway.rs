//! Order gateway: host orders in, broker order events out.
//!
//! ```text
//! host ──place/update/cancel──► OrderGateway ──REST──► broker
//!                                    ▲
//!   OrderEventChannel ──OrderEventSink┘ (pushes)
//!   reconcile_order_book ────────────┘ (poll)
//!                                    │
//!                                    ▼
//!                         BrokerageEvent::Order ──► host
//! ```
//!
//! Socket pushes and order-book polls both carry the broker's *cumulative*
//! filled quantity. Both go through [`OrderStore::apply_cumulative_fill`], so
//! a fill reported by either path (or by both) reaches the host exactly once.
//!
//! Place / modify / cancel round trips are serialized by one async lock.
//! While a place is in flight, pushes for not-yet-known broker ids are parked
//! and replayed once the broker id is linked.

use std::sync::Arc;

use ahash::AHashMap;
use fy_core::{
    FyError, InputOrder, OpenOrder, OrderEvent, OrderStatus, OrderType,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::models::{ModifyOrderRequest, OrderRow, PlaceOrderRequest, TradeRow};
use super::order_socket::OrderEventSink;
use super::order_store::{FillDecision, OrderRecord, OrderStore};
use super::rest::RestClient;
use super::symbol_mapper::SymbolMapper;
use crate::event::{BrokerageEvent, BrokerageEventSender};

const LABEL: &str = "fyers-orders";

pub const PLACE_ERROR_CODE: &str = "PlaceOrderError";
pub const UPDATE_ERROR_CODE: &str = "UpdateOrderError";
pub const CANCEL_ERROR_CODE: &str = "CancelOrderError";

pub struct OrderGateway {
    rest: Arc<RestClient>,
    symbols: Arc<SymbolMapper>,
    store: OrderStore,
    events: BrokerageEventSender,
    op_lock: tokio::sync::Mutex<()>,
    /// Last execution price per broker order id.
    trade_prices: Mutex<AHashMap<String, f64>>,
    /// `Some` while a place request is in flight.
    parked: Mutex<Option<Vec<OrderRow>>>,
}

impl OrderGateway {
    pub fn new(
        rest: Arc<RestClient>,
        symbols: Arc<SymbolMapper>,
        events: BrokerageEventSender,
    ) -> Self {
        Self {
            rest,
            symbols,
            store: OrderStore::new(),
            events,
            op_lock: tokio::sync::Mutex::new(()),
            trade_prices: Mutex::new(AHashMap::new()),
            parked: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    /// Submit a new order. Returns `false` when the broker (or local
    /// validation) rejected it; an `Invalid` event has been emitted then.
    pub async fn place_order(&self, order: &InputOrder) -> bool {
        let _guard = self.op_lock.lock().await;
        let host = order.host_order_id;

        let symbol = match self.symbols.to_broker_symbol(&order.instrument) {
            Ok(symbol) => symbol,
            Err(e) => {
                self.reject(host, e.to_string());
                return false;
            }
        };
        let qty = match validate(order) {
            Ok(qty) => qty,
            Err(e) => {
                self.reject(host, e.to_string());
                return false;
            }
        };

        self.store.insert(OrderRecord {
            host_order_id: host,
            broker_order_ids: Vec::new(),
            instrument: order.instrument.clone(),
            direction: order.direction,
            order_type: order.order_type,
            quantity: order.quantity,
            limit_price: order.limit_price,
            stop_price: order.stop_price,
            status: OrderStatus::New,
        });
        *self.parked.lock() = Some(Vec::new());

        let req = PlaceOrderRequest {
            symbol: symbol.clone(),
            qty,
            order_type: order.order_type.wire_code(),
            side: order.direction.wire_code(),
            product_type: order.product_type.wire_name().to_string(),
            limit_price: order.limit_price.unwrap_or(0.0),
            stop_price: order.stop_price.unwrap_or(0.0),
            validity: "DAY".to_string(),
            disclosed_qty: 0,
            offline_order: false,
            order_tag: order.tag.clone(),
        };

        let result = match self.rest.place_order(&req).await {
            Ok(resp) if resp.id.is_empty() => {
                Err(FyError::Data("place response carried no order id".into()))
            }
            other => other,
        };

        match result {
            Ok(resp) => {
                let mut parked = self.parked.lock();
                self.store.link_broker_id(host, &resp.id);
                self.store.set_status(host, OrderStatus::Submitted);
                info!("[{LABEL}] placed #{host} {symbol} qty={qty} -> {}", resp.id);
                self.emit(OrderEvent::status(
                    host,
                    Some(resp.id.clone()),
                    OrderStatus::Submitted,
                    resp.message,
                ));
                let early = parked.take().unwrap_or_default();
                for row in early.iter().filter(|r| r.id == resp.id) {
                    self.process_order_row(row);
                }
                true
            }
            Err(e) => {
                *self.parked.lock() = None;
                self.store.remove(host);
                self.reject(host, e.to_string());
                false
            }
        }
    }

    /// Modify an open order. Orders not in an open state are rejected locally.
    pub async fn update_order(&self, order: &InputOrder) -> bool {
        let _guard = self.op_lock.lock().await;
        let host = order.host_order_id;

        let Some(record) = self.store.get(host) else {
            self.warn(UPDATE_ERROR_CODE, format!("order #{host} is not tracked"));
            return false;
        };
        let Some(broker_id) = record.broker_order_id().map(str::to_string) else {
            self.warn(UPDATE_ERROR_CODE, format!("order #{host} has no broker id"));
            return false;
        };
        if !record.status.is_open() {
            self.warn(
                UPDATE_ERROR_CODE,
                format!("order #{host} cannot be modified in state {:?}", record.status),
            );
            return false;
        }
        let qty = match validate(order) {
            Ok(qty) => qty,
            Err(e) => {
                self.warn(UPDATE_ERROR_CODE, format!("order #{host}: {e}"));
                return false;
            }
        };

        let req = ModifyOrderRequest {
            id: broker_id.clone(),
            order_type: order.order_type.wire_code(),
            qty: Some(qty),
            limit_price: order.limit_price,
            stop_price: order.stop_price,
        };
        match self.rest.modify_order(&req).await {
            Ok(resp) => {
                if !resp.id.is_empty() && resp.id != broker_id {
                    self.store.link_broker_id(host, &resp.id);
                }
                self.store
                    .amend(host, order.quantity, order.limit_price, order.stop_price);
                self.store.set_status(host, OrderStatus::UpdateSubmitted);
                info!("[{LABEL}] modify #{host} ({broker_id}) submitted");
                self.emit(OrderEvent::status(
                    host,
                    Some(broker_id),
                    OrderStatus::UpdateSubmitted,
                    resp.message,
                ));
                true
            }
            Err(e) => {
                self.warn(UPDATE_ERROR_CODE, format!("order #{host}: {e}"));
                false
            }
        }
    }

    /// Request cancellation of an open order.
    pub async fn cancel_order(&self, host_order_id: u64) -> bool {
        let _guard = self.op_lock.lock().await;
        let host = host_order_id;

        let Some(record) = self.store.get(host) else {
            self.warn(CANCEL_ERROR_CODE, format!("order #{host} is not tracked"));
            return false;
        };
        let Some(broker_id) = record.broker_order_id().map(str::to_string) else {
            self.warn(CANCEL_ERROR_CODE, format!("order #{host} has no broker id"));
            return false;
        };
        if !record.status.is_open() {
            self.warn(
                CANCEL_ERROR_CODE,
                format!("order #{host} cannot be cancelled in state {:?}", record.status),
            );
            return false;
        }

        let previous = self.store.set_status(host, OrderStatus::CancelPending);
        match self.rest.cancel_order(&broker_id).await {
            Ok(resp) => {
                info!("[{LABEL}] cancel #{host} ({broker_id}) submitted");
                self.emit(OrderEvent::status(
                    host,
                    Some(broker_id),
                    OrderStatus::CancelPending,
                    resp.message,
                ));
                true
            }
            Err(e) => {
                if let Some(previous) = previous {
                    self.store.set_status(host, previous);
                }
                self.warn(CANCEL_ERROR_CODE, format!("order #{host}: {e}"));
                false
            }
        }
    }

    /// Open orders from the broker order book, host ids attached where known.
    pub async fn get_open_orders(&self) -> Result<Vec<OpenOrder>, FyError> {
        let rows = self.rest.order_book().await?;
        let mut out = Vec::new();
        for row in rows {
            if OrderStatus::from_wire(row.status) != Some(OrderStatus::Submitted) {
                continue;
            }
            match self.open_order_from_row(&row) {
                Ok(open) => out.push(open),
                Err(e) => warn!("[{LABEL}] skipping open order {}: {e}", row.id),
            }
        }
        Ok(out)
    }

    fn open_order_from_row(&self, row: &OrderRow) -> Result<OpenOrder, FyError> {
        let instrument = self.symbols.to_instrument(&row.symbol, None, None)?;
        let direction = fy_core::Direction::from_wire(row.side)
            .ok_or_else(|| FyError::Parse(format!("side {}", row.side)))?;
        let order_type = OrderType::from_wire(row.order_type)
            .ok_or_else(|| FyError::Parse(format!("order type {}", row.order_type)))?;
        let host_order_id = self.store.host_id_for(&row.id);
        let status = match host_order_id.and_then(|h| self.store.get(h)) {
            Some(record) => record.status,
            None if row.filled_qty > 0.0 => OrderStatus::PartiallyFilled,
            None => OrderStatus::Submitted,
        };
        Ok(OpenOrder {
            broker_order_id: row.id.clone(),
            host_order_id,
            instrument,
            direction,
            order_type,
            quantity: row.qty,
            filled_quantity: row.filled_qty,
            limit_price: (row.limit_price > 0.0).then_some(row.limit_price),
            stop_price: (row.stop_price > 0.0).then_some(row.stop_price),
            status,
        })
    }

    /// Poll the order book and apply it to tracked orders. Returns the number
    /// of rows that matched a tracked order.
    pub async fn reconcile_order_book(&self) -> Result<usize, FyError> {
        let rows = self.rest.order_book().await?;
        let mut matched = 0;
        for row in &rows {
            if self.store.host_id_for(&row.id).is_some() {
                matched += 1;
                self.process_order_row(row);
            }
        }
        debug!("[{LABEL}] order book reconciled: {matched}/{} tracked", rows.len());
        Ok(matched)
    }

    /// Apply one broker order report to a tracked order.
    fn process_order_row(&self, row: &OrderRow) {
        let Some(host) = self.store.host_id_for(&row.id) else {
            return;
        };
        let Some(record) = self.store.get(host) else {
            return;
        };
        let status = OrderStatus::from_wire(row.status);

        // A traded report may omit the filled quantity.
        let cumulative = if status == Some(OrderStatus::Filled) && row.filled_qty <= 0.0 {
            record.quantity
        } else {
            row.filled_qty
        };

        match self.store.apply_cumulative_fill(host, cumulative) {
            FillDecision::Stale => {}
            FillDecision::Partial { delta } => {
                self.emit_fill(&record, row, OrderStatus::PartiallyFilled, delta);
            }
            FillDecision::Complete { delta } => {
                self.emit_fill(&record, row, OrderStatus::Filled, delta);
                self.forget_prices(&record);
                return;
            }
        }

        match status {
            Some(terminal @ (OrderStatus::Canceled | OrderStatus::Invalid)) => {
                self.store.remove(host);
                self.forget_prices(&record);
                info!("[{LABEL}] #{host} ({}) {terminal:?}: {}", row.id, row.message);
                self.emit(OrderEvent::status(
                    host,
                    Some(row.id.clone()),
                    terminal,
                    row.message.clone(),
                ));
            }
            Some(OrderStatus::Submitted) if record.status == OrderStatus::UpdateSubmitted => {
                self.store.set_status(host, OrderStatus::Submitted);
                self.emit(OrderEvent::status(
                    host,
                    Some(row.id.clone()),
                    OrderStatus::Submitted,
                    row.message.clone(),
                ));
            }
            Some(_) => {}
            None => debug!("[{LABEL}] #{host} unmapped broker status {}", row.status),
        }
    }

    fn emit_fill(&self, record: &OrderRecord, row: &OrderRow, status: OrderStatus, delta: f64) {
        let price = self
            .trade_prices
            .lock()
            .get(&row.id)
            .copied()
            .filter(|p| *p > 0.0)
            .or_else(|| (row.traded_price > 0.0).then_some(row.traded_price))
            .or(record.limit_price)
            .unwrap_or(0.0);
        let fill_quantity = record.direction.sign() * delta;
        info!(
            "[{LABEL}] #{} ({}) {status:?} {fill_quantity} @ {price}",
            record.host_order_id, row.id
        );
        let mut event = OrderEvent::status(
            record.host_order_id,
            Some(row.id.clone()),
            status,
            row.message.clone(),
        );
        event.fill_quantity = fill_quantity;
        event.fill_price = price;
        self.emit(event);
    }

    fn forget_prices(&self, record: &OrderRecord) {
        let mut prices = self.trade_prices.lock();
        for id in &record.broker_order_ids {
            prices.remove(id);
        }
    }

    fn reject(&self, host_order_id: u64, message: String) {
        warn!("[{LABEL}] order #{host_order_id} rejected: {message}");
        self.emit(OrderEvent::status(
            host_order_id,
            None,
            OrderStatus::Invalid,
            message.clone(),
        ));
        let _ = self
            .events
            .send(BrokerageEvent::warning(PLACE_ERROR_CODE, message));
    }

    fn warn(&self, code: &str, message: String) {
        warn!("[{LABEL}] {message}");
        let _ = self.events.send(BrokerageEvent::warning(code, message));
    }

    fn emit(&self, event: OrderEvent) {
        let _ = self.events.send(BrokerageEvent::Order(event));
    }
}

impl OrderEventSink for OrderGateway {
    fn on_order(&self, order: OrderRow) {
        {
            let mut parked = self.parked.lock();
            if self.store.host_id_for(&order.id).is_none() {
                match parked.as_mut() {
                    Some(rows) => rows.push(order),
                    None => debug!("[{LABEL}] update for unknown order {}", order.id),
                }
                return;
            }
        }
        self.process_order_row(&order);
    }

    fn on_trade(&self, trade: TradeRow) {
        if trade.trade_price > 0.0 && self.store.host_id_for(&trade.order_number).is_some() {
            self.trade_prices
                .lock()
                .insert(trade.order_number, trade.trade_price);
        }
    }

    fn on_broker_error(&self, message: &str) {
        let _ = self
            .events
            .send(BrokerageEvent::warning("OrderSocketError", message));
    }
}

/// Check order fields and return the broker quantity.
fn validate(order: &InputOrder) -> Result<i64, FyError> {
    if !order.quantity.is_finite() || order.quantity < 1.0 || order.quantity.fract() != 0.0 {
        return Err(FyError::Input(format!(
            "quantity must be a positive whole number, got {}",
            order.quantity
        )));
    }
    let needs_limit = matches!(order.order_type, OrderType::Limit | OrderType::StopLimit);
    let needs_stop = matches!(order.order_type, OrderType::StopMarket | OrderType::StopLimit);
    if needs_limit && order.limit_price.is_none_or(|p| p <= 0.0) {
        return Err(FyError::Input(format!(
            "{:?} order requires a positive limit price",
            order.order_type
        )));
    }
    if needs_stop && order.stop_price.is_none_or(|p| p <= 0.0) {
        return Err(FyError::Input(format!(
            "{:?} order requires a positive stop price",
            order.order_type
        )));
    }
    Ok(order.quantity as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, BrokerageEventReceiver, MessageLevel};
    use fy_core::config::{BrokerageConfig, RestConfig};
    use fy_core::{Direction, Instrument, Market, ProductType};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> (OrderGateway, BrokerageEventReceiver) {
        let config = BrokerageConfig {
            client_id: "XX0000-100".into(),
            access_token: "tok".into(),
            rest: RestConfig {
                rest_url: server.uri(),
                data_url: server.uri(),
                max_retries: 0,
                ..Default::default()
            },
            market_data: Default::default(),
            order_events: Default::default(),
            supervisor: Default::default(),
            subscriptions: vec![],
        };
        let rest = Arc::new(RestClient::new(&config).unwrap());
        let (tx, rx) = event::channel();
        (OrderGateway::new(rest, Arc::new(SymbolMapper::new()), tx), rx)
    }

    fn buy(host: u64, qty: f64) -> InputOrder {
        InputOrder {
            host_order_id: host,
            instrument: Instrument::equity("SBIN", Market::Nse),
            direction: Direction::Buy,
            order_type: OrderType::Limit,
            product_type: ProductType::Intraday,
            quantity: qty,
            limit_price: Some(800.0),
            stop_price: None,
            tag: None,
        }
    }

    fn row(id: &str, filled: f64, status: i32) -> OrderRow {
        OrderRow {
            id: id.into(),
            symbol: "NSE:SBIN-EQ".into(),
            qty: 100.0,
            filled_qty: filled,
            status,
            side: 1,
            order_type: 1,
            limit_price: 800.0,
            ..Default::default()
        }
    }

    async fn mount_place(server: &MockServer, id: &str) {
        Mock::given(method("POST"))
            .and(path("/api/v3/orders/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok", "code": 1101, "message": "Order submitted", "id": id
            })))
            .mount(server)
            .await;
    }

    fn drain(rx: &mut BrokerageEventReceiver) -> Vec<BrokerageEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn order_events(events: &[BrokerageEvent]) -> Vec<(OrderStatus, f64)> {
        events
            .iter()
            .filter_map(|e| match e {
                BrokerageEvent::Order(o) => Some((o.status, o.fill_quantity)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn fills_from_socket_and_poll_are_emitted_once() {
        let server = MockServer::start().await;
        mount_place(&server, "B1").await;
        let (gw, mut rx) = gateway(&server);

        assert!(gw.place_order(&buy(1, 100.0)).await);
        gw.on_order(row("B1", 30.0, 6));
        gw.on_order(row("B1", 30.0, 6));
        gw.on_order(row("B1", 50.0, 6));
        gw.on_order(row("B1", 20.0, 6));
        gw.on_order(row("B1", 100.0, 2));
        gw.on_order(row("B1", 100.0, 2));

        assert_eq!(
            order_events(&drain(&mut rx)),
            vec![
                (OrderStatus::Submitted, 0.0),
                (OrderStatus::PartiallyFilled, 30.0),
                (OrderStatus::PartiallyFilled, 20.0),
                (OrderStatus::Filled, 50.0),
            ]
        );
        assert!(gw.store().is_empty());
    }

    #[tokio::test]
    async fn order_book_poll_reconciles_fills() {
        let server = MockServer::start().await;
        mount_place(&server, "B2").await;
        Mock::given(method("GET"))
            .and(path("/api/v3/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "orderBook": [
                    {"id": "B2", "symbol": "NSE:SBIN-EQ", "qty": 100, "filledQty": 40,
                     "status": 6, "side": 1, "type": 1, "tradedPrice": 801.5},
                    {"id": "OTHER", "symbol": "NSE:SBIN-EQ", "qty": 5, "status": 6}
                ]
            })))
            .mount(&server)
            .await;
        let (gw, mut rx) = gateway(&server);

        assert!(gw.place_order(&buy(2, 100.0)).await);
        gw.on_order(row("B2", 40.0, 6));
        assert_eq!(gw.reconcile_order_book().await.unwrap(), 1);

        let events = drain(&mut rx);
        assert_eq!(
            order_events(&events),
            vec![
                (OrderStatus::Submitted, 0.0),
                (OrderStatus::PartiallyFilled, 40.0),
            ]
        );
    }

    #[tokio::test]
    async fn trade_price_wins_over_limit() {
        let server = MockServer::start().await;
        mount_place(&server, "B3").await;
        let (gw, mut rx) = gateway(&server);

        assert!(gw.place_order(&buy(3, 100.0)).await);
        gw.on_trade(TradeRow {
            order_number: "B3".into(),
            traded_qty: 10.0,
            trade_price: 799.5,
            ..Default::default()
        });
        gw.on_order(row("B3", 10.0, 6));

        let fill = drain(&mut rx)
            .into_iter()
            .find_map(|e| match e {
                BrokerageEvent::Order(o) if o.status == OrderStatus::PartiallyFilled => Some(o),
                _ => None,
            })
            .unwrap();
        assert_eq!(fill.fill_price, 799.5);
        assert_eq!(fill.broker_order_id.as_deref(), Some("B3"));
    }

    #[tokio::test]
    async fn broker_rejection_emits_invalid_and_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/orders/sync"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "s": "error", "code": -50, "message": "Insufficient funds",
                "error_type": "OrderException"
            })))
            .mount(&server)
            .await;
        let (gw, mut rx) = gateway(&server);

        assert!(!gw.place_order(&buy(4, 10.0)).await);
        let events = drain(&mut rx);
        match &events[0] {
            BrokerageEvent::Order(o) => {
                assert_eq!(o.status, OrderStatus::Invalid);
                assert!(o.message.contains("Insufficient funds"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &events[1],
            BrokerageEvent::Message { level: MessageLevel::Warning, code, .. } if code == PLACE_ERROR_CODE
        ));
        assert!(gw.store().is_empty());
    }

    #[tokio::test]
    async fn invalid_orders_never_reach_the_broker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let (gw, mut rx) = gateway(&server);

        let mut no_price = buy(5, 10.0);
        no_price.limit_price = None;
        assert!(!gw.place_order(&no_price).await);

        let mut crypto = buy(6, 10.0);
        crypto.instrument = Instrument::plain("BTC", fy_core::SecurityKind::Crypto, Market::Nse);
        assert!(!gw.place_order(&crypto).await);

        let invalid = order_events(&drain(&mut rx));
        assert_eq!(invalid, vec![(OrderStatus::Invalid, 0.0), (OrderStatus::Invalid, 0.0)]);
    }

    #[tokio::test]
    async fn cancel_then_broker_confirms() {
        let server = MockServer::start().await;
        mount_place(&server, "B7").await;
        Mock::given(method("DELETE"))
            .and(path("/api/v3/orders/sync"))
            .and(body_partial_json(json!({"id": "B7"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok", "code": 1103, "message": "cancel requested", "id": "B7"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (gw, mut rx) = gateway(&server);

        assert!(gw.place_order(&buy(7, 10.0)).await);
        assert!(gw.cancel_order(7).await);
        gw.on_order(row("B7", 0.0, 1));

        assert_eq!(
            order_events(&drain(&mut rx)),
            vec![
                (OrderStatus::Submitted, 0.0),
                (OrderStatus::CancelPending, 0.0),
                (OrderStatus::Canceled, 0.0),
            ]
        );
        assert!(gw.store().is_empty());
        // Already gone: no network call, just a warning.
        assert!(!gw.cancel_order(7).await);
    }

    #[tokio::test]
    async fn modify_of_non_open_order_is_rejected_locally() {
        let server = MockServer::start().await;
        mount_place(&server, "B8").await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok", "code": 1103, "message": "ok", "id": "B8"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let (gw, mut rx) = gateway(&server);

        assert!(gw.place_order(&buy(8, 10.0)).await);
        assert!(gw.cancel_order(8).await);
        drain(&mut rx);

        assert!(!gw.update_order(&buy(8, 20.0)).await);
        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [BrokerageEvent::Message { code, .. }] if code == UPDATE_ERROR_CODE
        ));
    }

    #[tokio::test]
    async fn modify_confirmed_by_socket() {
        let server = MockServer::start().await;
        mount_place(&server, "B9").await;
        Mock::given(method("PATCH"))
            .and(path("/api/v3/orders/sync"))
            .and(body_partial_json(json!({"id": "B9", "qty": 20, "limitPrice": 805.0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok", "code": 1102, "message": "modified", "id": "B9"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (gw, mut rx) = gateway(&server);

        assert!(gw.place_order(&buy(9, 10.0)).await);
        let mut modified = buy(9, 20.0);
        modified.limit_price = Some(805.0);
        assert!(gw.update_order(&modified).await);
        assert_eq!(gw.store().get(9).unwrap().quantity, 20.0);

        gw.on_order(row("B9", 0.0, 6));
        assert_eq!(
            order_events(&drain(&mut rx)),
            vec![
                (OrderStatus::Submitted, 0.0),
                (OrderStatus::UpdateSubmitted, 0.0),
                (OrderStatus::Submitted, 0.0),
            ]
        );
        assert_eq!(gw.store().get(9).unwrap().status, OrderStatus::Submitted);
    }

    #[tokio::test]
    async fn open_orders_from_order_book() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "orderBook": [
                    {"id": "X1", "symbol": "NSE:SBIN-EQ", "qty": 10, "filledQty": 4,
                     "status": 6, "side": -1, "type": 1, "limitPrice": 810.0},
                    {"id": "X2", "symbol": "NSE:SBIN-EQ", "qty": 10, "status": 2, "side": 1, "type": 2},
                    {"id": "X3", "symbol": "garbage", "qty": 1, "status": 6, "side": 1, "type": 2}
                ]
            })))
            .mount(&server)
            .await;
        let (gw, _rx) = gateway(&server);

        let open = gw.get_open_orders().await.unwrap();
        assert_eq!(open.len(), 1);
        let o = &open[0];
        assert_eq!(o.broker_order_id, "X1");
        assert_eq!(o.host_order_id, None);
        assert_eq!(o.direction, Direction::Sell);
        assert_eq!(o.status, OrderStatus::PartiallyFilled);
        assert_eq!(o.limit_price, Some(810.0));
        assert_eq!(o.stop_price, None);
    }

    #[test]
    fn quantity_validation() {
        assert_eq!(validate(&buy(1, 25.0)).unwrap(), 25);
        assert!(validate(&buy(1, 0.0)).is_err());
        assert!(validate(&buy(1, 2.5)).is_err());
        let mut stop = buy(1, 1.0);
        stop.order_type = OrderType::StopMarket;
        assert!(validate(&stop).is_err());
        stop.stop_price = Some(790.0);
        assert!(validate(&stop).is_ok());
    }
}
