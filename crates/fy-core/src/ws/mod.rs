//! WebSocket transport shared by the market-data and order-event channels.

pub mod client;
pub mod state;

pub use client::{Outbound, PingPayload, WsConnConfig, WsConnection, WsHandler, WsSender};
pub use state::{ChannelState, StateCell};
