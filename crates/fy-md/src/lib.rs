//! # fy-md
//!
//! Broker market-data feed over a binary WebSocket.
//!
//! - [`codec`]: packet framing, cursor reader, frame builders
//! - [`auth`]: session credential extraction from the access token
//! - [`subscription`]: the Subscription Set replayed on every session
//! - [`channel`]: [`MarketDataChannel`]: auth handshake, acks, tick emission

pub mod auth;
pub mod channel;
pub mod codec;
pub mod subscription;

pub use channel::MarketDataChannel;
pub use subscription::SubscriptionSet;
