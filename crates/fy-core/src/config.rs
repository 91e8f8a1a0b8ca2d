//! Configuration parsing for the brokerage adapter.
//!
//! All settings come from a single JSON file. The top level holds logging
//! metadata and a `brokerage` block with credentials, endpoints and timing.
//! Every field except the credentials has a production default, so a minimal
//! config only needs `client_id` and `access_token`.
//!
//! # Example config
//!
//! ```json
//! {
//!   "FyersBrokerage": { "module_name": "fyers", "log_path": "/tmp/log" },
//!   "brokerage": {
//!     "client_id": "XX0000-100",
//!     "access_token": "eyJ...",
//!     "rest": { "max_retries": 3 },
//!     "supervisor": { "market_data_max_attempts": 10 },
//!     "subscriptions": ["NSE:SBIN-EQ", "NSE:NIFTY50-INDEX"]
//!   }
//! }
//! ```

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(rename = "FyersBrokerage", default)]
    pub meta: ModuleMeta,

    pub brokerage: BrokerageConfig,
}

/// Module metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
    pub log_level: Option<String>,
}

impl ModuleMeta {
    pub fn module_name(&self) -> &str {
        self.module_name.as_deref().unwrap_or("fyers")
    }
}

/// Everything the brokerage facade needs.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerageConfig {
    /// Broker app client ID (`XX0000-100`).
    pub client_id: String,

    /// Session access token (JWT issued by the broker login flow).
    pub access_token: String,

    #[serde(default)]
    pub rest: RestConfig,

    #[serde(default)]
    pub market_data: MarketDataConfig,

    #[serde(default)]
    pub order_events: OrderEventConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Broker symbols to subscribe right after connect (runner only).
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

impl BrokerageConfig {
    /// Value of the `Authorization` header used by REST and the order socket.
    pub fn auth_header(&self) -> String {
        format!("{}:{}", self.client_id, self.access_token)
    }

    /// Reject configs that cannot possibly authenticate.
    pub fn validate(&self) -> Result<(), crate::error::FyError> {
        if self.client_id.trim().is_empty() {
            return Err(crate::error::FyError::Config("client_id is empty".into()));
        }
        if self.access_token.trim().is_empty() {
            return Err(crate::error::FyError::Config("access_token is empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

/// REST client settings: endpoints, rate limits and retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// Base URL of the market-data REST service (history, quotes).
    #[serde(default = "default_data_url")]
    pub data_url: String,

    /// General endpoints: requests per second.
    #[serde(default = "default_general_per_sec")]
    pub general_per_sec: u32,

    /// Order endpoints: requests per second.
    #[serde(default = "default_order_per_sec")]
    pub order_per_sec: u32,

    /// History endpoint: requests per second.
    #[serde(default = "default_history_per_sec")]
    pub history_per_sec: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear retry step for transport failures (ms).
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Linear retry step for HTTP 429 (ms).
    #[serde(default = "default_rate_limit_base_ms")]
    pub rate_limit_base_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl RestConfig {
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn rate_limit_base(&self) -> Duration {
        Duration::from_millis(self.rate_limit_base_ms)
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            data_url: default_data_url(),
            general_per_sec: default_general_per_sec(),
            order_per_sec: default_order_per_sec(),
            history_per_sec: default_history_per_sec(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            rate_limit_base_ms: default_rate_limit_base_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Market-data channel
// ---------------------------------------------------------------------------

/// Market-data WebSocket settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_data_ws_url")]
    pub ws_url: String,

    /// Broker ping frame interval (seconds).
    #[serde(default = "default_md_ping_secs")]
    pub ping_interval_secs: u64,

    /// Time allowed for transport open plus auth ack (seconds).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Source tag sent in the auth frame.
    #[serde(default = "default_source_tag")]
    pub source: String,

    /// Capacity of the tick sink channel.
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
}

impl MarketDataConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            ws_url: default_data_ws_url(),
            ping_interval_secs: default_md_ping_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            source: default_source_tag(),
            sink_capacity: default_sink_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Order-event channel
// ---------------------------------------------------------------------------

/// Order-event WebSocket settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEventConfig {
    #[serde(default = "default_order_ws_url")]
    pub ws_url: String,

    /// Text `"ping"` interval (seconds).
    #[serde(default = "default_order_ping_secs")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Interval for REST order-book reconciliation (seconds, 0 = disabled).
    #[serde(default = "default_order_poll_secs")]
    pub order_poll_secs: u64,
}

impl OrderEventConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for OrderEventConfig {
    fn default() -> Self {
        Self {
            ws_url: default_order_ws_url(),
            ping_interval_secs: default_order_ping_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            order_poll_secs: default_order_poll_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Connection supervisor timing and reconnect ceilings.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Health check interval (seconds).
    #[serde(default = "default_health_secs")]
    pub health_check_secs: u64,

    /// Market-data staleness threshold before a resubscribe probe (seconds).
    #[serde(default = "default_stale_secs")]
    pub stale_after_secs: u64,

    /// Backoff exponent cap: base delay is `2^min(attempt, cap)` seconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_exponent_cap: u32,

    #[serde(default = "default_md_max_attempts")]
    pub market_data_max_attempts: u32,

    #[serde(default = "default_order_max_attempts")]
    pub order_events_max_attempts: u32,
}

impl SupervisorConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_check_secs: default_health_secs(),
            stale_after_secs: default_stale_secs(),
            backoff_exponent_cap: default_backoff_cap(),
            market_data_max_attempts: default_md_max_attempts(),
            order_events_max_attempts: default_order_max_attempts(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_rest_url() -> String {
    "https://api-t1.fyers.in".into()
}

fn default_data_url() -> String {
    "https://api-t1.fyers.in".into()
}

fn default_data_ws_url() -> String {
    "wss://socket.fyers.in/hsm/v1-5/prod".into()
}

fn default_order_ws_url() -> String {
    "wss://socket.fyers.in/trade/v3".into()
}

fn default_general_per_sec() -> u32 {
    10
}

fn default_order_per_sec() -> u32 {
    10
}

fn default_history_per_sec() -> u32 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_rate_limit_base_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_md_ping_secs() -> u64 {
    10
}

fn default_order_ping_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_source_tag() -> String {
    "FyRust".into()
}

fn default_sink_capacity() -> usize {
    65_536
}

fn default_order_poll_secs() -> u64 {
    0
}

fn default_health_secs() -> u64 {
    5
}

fn default_stale_secs() -> u64 {
    60
}

fn default_backoff_cap() -> u32 {
    6
}

fn default_md_max_attempts() -> u32 {
    10
}

fn default_order_max_attempts() -> u32 {
    10
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.brokerage.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let json = r#"{ "brokerage": { "client_id": "XX0000-100", "access_token": "tok" } }"#;
        let cfg: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.meta.module_name(), "fyers");
        assert_eq!(cfg.brokerage.auth_header(), "XX0000-100:tok");
        assert_eq!(cfg.brokerage.rest.max_retries, 3);
        assert_eq!(cfg.brokerage.supervisor.backoff_exponent_cap, 6);
        assert!(cfg.brokerage.subscriptions.is_empty());
        assert!(cfg.brokerage.validate().is_ok());
    }

    #[test]
    fn overrides_and_validation() {
        let json = r#"{
            "FyersBrokerage": { "module_name": "fy-live", "log_path": "/tmp/log" },
            "brokerage": {
                "client_id": "",
                "access_token": "tok",
                "supervisor": { "market_data_max_attempts": 3 },
                "subscriptions": ["NSE:SBIN-EQ"]
            }
        }"#;
        let cfg: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.meta.module_name(), "fy-live");
        assert_eq!(cfg.brokerage.supervisor.market_data_max_attempts, 3);
        assert_eq!(cfg.brokerage.supervisor.order_events_max_attempts, 10);
        assert_eq!(cfg.brokerage.subscriptions, vec!["NSE:SBIN-EQ".to_string()]);
        assert!(cfg.brokerage.validate().is_err());
    }
}
