//! # fy-core
//!
//! Core crate for the Fyers brokerage adapter, providing:
//!
//! - **Types** (`types`): instrument identity, enums, market data, trading structs
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): the `FyError` taxonomy via thiserror
//! - **WebSocket** (`ws`): single-session WS transport + channel state
//! - **Time utilities** (`time_util`): timestamps and the monthly expiry calendar
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use error::FyError;
pub use types::*;
