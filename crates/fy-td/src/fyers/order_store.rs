//! Order-id map and fill accumulator behind one lock.
//!
//! Broker order updates report the *cumulative* filled quantity, and the same
//! update can arrive twice (socket push plus order-book poll) or out of order.
//! [`OrderStore::apply_cumulative_fill`] turns those reports into exactly one
//! fill per quantity increase.

use ahash::AHashMap;
use fy_core::{Direction, Instrument, OrderStatus, OrderType};
use parking_lot::Mutex;

/// Quantities closer than this are treated as equal.
const QTY_EPSILON: f64 = 1e-9;

/// An order placed through this session.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub host_order_id: u64,
    /// Broker ids, oldest first. The broker may re-key an order on modify.
    pub broker_order_ids: Vec<String>,
    pub instrument: Instrument,
    pub direction: Direction,
    pub order_type: OrderType,
    /// Absolute quantity.
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub status: OrderStatus,
}

impl OrderRecord {
    /// Most recent broker id.
    pub fn broker_order_id(&self) -> Option<&str> {
        self.broker_order_ids.last().map(String::as_str)
    }
}

/// Outcome of a cumulative fill report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillDecision {
    /// Not above the stored cumulative quantity (or unknown order): ignore.
    Stale,
    /// New fill of `delta`; the order stays open.
    Partial { delta: f64 },
    /// New fill of `delta` that completes the order; tracking is dropped.
    Complete { delta: f64 },
}

#[derive(Debug, Default)]
struct Inner {
    orders: AHashMap<u64, OrderRecord>,
    broker_to_host: AHashMap<String, u64>,
    /// Cumulative filled quantity per host order id.
    filled: AHashMap<u64, f64>,
}

impl Inner {
    fn remove(&mut self, host_order_id: u64) -> Option<OrderRecord> {
        let record = self.orders.remove(&host_order_id)?;
        for id in &record.broker_order_ids {
            self.broker_to_host.remove(id);
        }
        self.filled.remove(&host_order_id);
        Some(record)
    }
}

#[derive(Debug, Default)]
pub struct OrderStore {
    inner: Mutex<Inner>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an order. Replaces any record with the same host id.
    pub fn insert(&self, record: OrderRecord) {
        let mut inner = self.inner.lock();
        for id in &record.broker_order_ids {
            inner.broker_to_host.insert(id.clone(), record.host_order_id);
        }
        inner.orders.insert(record.host_order_id, record);
    }

    /// Associate a broker id with a tracked order. Returns `false` when the
    /// host order is no longer tracked.
    pub fn link_broker_id(&self, host_order_id: u64, broker_order_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(record) = inner.orders.get_mut(&host_order_id) else {
            return false;
        };
        if !record.broker_order_ids.iter().any(|id| id == broker_order_id) {
            record.broker_order_ids.push(broker_order_id.to_string());
        }
        inner
            .broker_to_host
            .insert(broker_order_id.to_string(), host_order_id);
        true
    }

    pub fn host_id_for(&self, broker_order_id: &str) -> Option<u64> {
        self.inner.lock().broker_to_host.get(broker_order_id).copied()
    }

    pub fn get(&self, host_order_id: u64) -> Option<OrderRecord> {
        self.inner.lock().orders.get(&host_order_id).cloned()
    }

    /// Update the status; returns the previous one.
    pub fn set_status(&self, host_order_id: u64, status: OrderStatus) -> Option<OrderStatus> {
        let mut inner = self.inner.lock();
        let record = inner.orders.get_mut(&host_order_id)?;
        Some(std::mem::replace(&mut record.status, status))
    }

    /// Apply modified order parameters after the broker accepted them.
    pub fn amend(&self, host_order_id: u64, quantity: f64, limit_price: Option<f64>, stop_price: Option<f64>) {
        if let Some(record) = self.inner.lock().orders.get_mut(&host_order_id) {
            record.quantity = quantity;
            record.limit_price = limit_price;
            record.stop_price = stop_price;
        }
    }

    /// Stop tracking an order, clearing its broker ids and accumulator.
    pub fn remove(&self, host_order_id: u64) -> Option<OrderRecord> {
        self.inner.lock().remove(host_order_id)
    }

    /// Atomically compare a cumulative fill report against the stored value
    /// and advance it.
    pub fn apply_cumulative_fill(&self, host_order_id: u64, cumulative: f64) -> FillDecision {
        let mut inner = self.inner.lock();
        let Some(quantity) = inner.orders.get(&host_order_id).map(|r| r.quantity) else {
            return FillDecision::Stale;
        };
        let stored = inner.filled.get(&host_order_id).copied().unwrap_or(0.0);
        if cumulative <= stored + QTY_EPSILON {
            return FillDecision::Stale;
        }

        let delta = cumulative - stored;
        if cumulative + QTY_EPSILON >= quantity {
            inner.remove(host_order_id);
            return FillDecision::Complete { delta };
        }

        inner.filled.insert(host_order_id, cumulative);
        if let Some(record) = inner.orders.get_mut(&host_order_id) {
            record.status = OrderStatus::PartiallyFilled;
        }
        FillDecision::Partial { delta }
    }

    pub fn filled_quantity(&self, host_order_id: u64) -> f64 {
        self.inner
            .lock()
            .filled
            .get(&host_order_id)
            .copied()
            .unwrap_or(0.0)
    }

    /// Snapshot of tracked orders, ordered by host id.
    pub fn orders(&self) -> Vec<OrderRecord> {
        let mut out: Vec<_> = self.inner.lock().orders.values().cloned().collect();
        out.sort_by_key(|r| r.host_order_id);
        out
    }

    pub fn len(&self) -> usize {
        self.inner.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fy_core::Market;

    fn record(host: u64, broker: &str, qty: f64) -> OrderRecord {
        OrderRecord {
            host_order_id: host,
            broker_order_ids: vec![broker.to_string()],
            instrument: Instrument::equity("SBIN", Market::Nse),
            direction: Direction::Buy,
            order_type: OrderType::Limit,
            quantity: qty,
            limit_price: Some(800.0),
            stop_price: None,
            status: OrderStatus::Submitted,
        }
    }

    #[test]
    fn duplicate_and_stale_fills_are_discarded() {
        let store = OrderStore::new();
        store.insert(record(1, "B1", 100.0));

        let decisions: Vec<_> = [30.0, 30.0, 50.0, 20.0]
            .into_iter()
            .map(|v| store.apply_cumulative_fill(1, v))
            .collect();
        assert_eq!(
            decisions,
            vec![
                FillDecision::Partial { delta: 30.0 },
                FillDecision::Stale,
                FillDecision::Partial { delta: 20.0 },
                FillDecision::Stale,
            ]
        );
        assert_eq!(store.filled_quantity(1), 50.0);
        let open = store.get(1).unwrap();
        assert_eq!(open.status, OrderStatus::PartiallyFilled);
        assert!(open.status.is_open());
    }

    #[test]
    fn completing_fill_drops_tracking() {
        let store = OrderStore::new();
        store.insert(record(7, "B7", 10.0));
        assert_eq!(store.apply_cumulative_fill(7, 4.0), FillDecision::Partial { delta: 4.0 });
        assert_eq!(store.apply_cumulative_fill(7, 10.0), FillDecision::Complete { delta: 6.0 });
        assert!(store.get(7).is_none());
        assert_eq!(store.host_id_for("B7"), None);
        assert_eq!(store.filled_quantity(7), 0.0);
        // Late duplicate of the final report.
        assert_eq!(store.apply_cumulative_fill(7, 10.0), FillDecision::Stale);
    }

    #[test]
    fn remove_clears_every_broker_id() {
        let store = OrderStore::new();
        store.insert(record(3, "B3", 5.0));
        assert!(store.link_broker_id(3, "B3-mod"));
        assert_eq!(store.host_id_for("B3-mod"), Some(3));
        assert_eq!(store.get(3).unwrap().broker_order_id(), Some("B3-mod"));

        store.remove(3);
        assert_eq!(store.host_id_for("B3"), None);
        assert_eq!(store.host_id_for("B3-mod"), None);
        assert!(!store.link_broker_id(3, "B3-late"));
        assert!(store.is_empty());
    }

    #[test]
    fn status_and_amend() {
        let store = OrderStore::new();
        store.insert(record(4, "B4", 5.0));
        assert_eq!(
            store.set_status(4, OrderStatus::UpdateSubmitted),
            Some(OrderStatus::Submitted)
        );
        store.amend(4, 8.0, Some(801.0), None);
        let r = store.get(4).unwrap();
        assert_eq!((r.quantity, r.limit_price), (8.0, Some(801.0)));
        assert_eq!(store.set_status(99, OrderStatus::Canceled), None);
        assert_eq!(store.orders().len(), 1);
    }
}
