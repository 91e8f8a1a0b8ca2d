//! Fyers trading plumbing.
//!
//! # Architecture
//!
//! ```text
//! OrderGateway
//! ├── RestClient          (rate-limited, retrying REST; one limiter per endpoint class)
//! ├── SymbolMapper        (Instrument <-> broker symbol, cached)
//! └── OrderStore          (host/broker id map + cumulative fill accumulator)
//!
//! OrderEventChannel ──OrderEventSink──► OrderGateway
//! ```
//!
//! All gateway methods take `&self` and may be called concurrently; place,
//! modify and cancel round trips are serialized inside the gateway.

pub mod gateway;
pub mod models;
pub mod order_socket;
pub mod order_store;
pub mod rate_limiter;
pub mod rest;
pub mod symbol_mapper;

pub use gateway::OrderGateway;
pub use order_socket::{OrderEventChannel, OrderEventSink};
pub use order_store::{FillDecision, OrderRecord, OrderStore};
pub use rest::RestClient;
pub use symbol_mapper::SymbolMapper;
