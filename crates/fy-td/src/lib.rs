//! # fy-td
//!
//! Order execution against the Fyers broker.
//!
//! | Component           | Module                      | Transport       |
//! |---------------------|-----------------------------|-----------------|
//! | REST client         | `fyers::rest`               | HTTPS           |
//! | Order-event channel | `fyers::order_socket`       | WebSocket, JSON |
//! | Order gateway       | `fyers::gateway`            | (REST + socket) |
//! | Symbol translator   | `fyers::symbol_mapper`      | -               |
//!
//! Host-facing events are delivered on an unbounded [`event`] channel.

pub mod event;
pub mod fyers;

pub use event::{BrokerageEvent, BrokerageEventReceiver, BrokerageEventSender, MessageLevel};
pub use fyers::{OrderEventChannel, OrderEventSink, OrderGateway, RestClient, SymbolMapper};
