//! Events the adapter pushes to the host.
//!
//! The host polls a [`BrokerageEventReceiver`] for order lifecycle events,
//! operator messages, and channel connectivity changes.

use fy_core::OrderEvent;

/// Severity of a host-visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Information,
    Warning,
    Error,
}

/// Message code carried by the terminal reconnect-exhausted message.
pub const DISCONNECT_CODE: &str = "Disconnect";

/// Message code carried when the broker rejects the session credential.
pub const SESSION_EXPIRED_CODE: &str = "SessionExpired";

/// A typed event emitted by the brokerage adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerageEvent {
    /// An order status change or fill.
    Order(OrderEvent),

    /// A message for the operator.
    Message {
        level: MessageLevel,
        /// Short machine-readable code (e.g. [`DISCONNECT_CODE`]).
        code: String,
        text: String,
    },

    /// A channel finished its handshake.
    Connected {
        /// `"market-data"` or `"order-events"`.
        channel: &'static str,
    },

    /// A channel dropped unexpectedly.
    Disconnected {
        channel: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

impl BrokerageEvent {
    pub fn message(level: MessageLevel, code: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            level,
            code: code.into(),
            text: text.into(),
        }
    }

    pub fn warning(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self::message(MessageLevel::Warning, code, text)
    }
}

/// Sender half of the brokerage event channel.
pub type BrokerageEventSender = tokio::sync::mpsc::UnboundedSender<BrokerageEvent>;

/// Receiver half of the brokerage event channel.
pub type BrokerageEventReceiver = tokio::sync::mpsc::UnboundedReceiver<BrokerageEvent>;

/// Create a connected sender / receiver pair.
pub fn channel() -> (BrokerageEventSender, BrokerageEventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
