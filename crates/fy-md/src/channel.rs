//! Market-data channel: one authenticated binary WebSocket session at a time.
//!
//! ```text
//! Disconnected → Connecting → Authenticating → Open → Disconnected
//!                                                 ↘ Closing (deliberate)
//! ```
//!
//! After the transport opens, the auth packet goes out immediately. The
//! channel becomes `Open` only when the auth ack carries the success status;
//! it then switches to full mode and replays the whole Subscription Set.
//! Subscriptions requested before that point only update the set.
//!
//! Reconnecting is driven from outside through [`MarketDataChannel::connect`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use crossbeam_channel::{Sender, TrySendError};
use fy_core::config::MarketDataConfig;
use fy_core::time_util;
use fy_core::ws::{
    ChannelState, Outbound, PingPayload, StateCell, WsConnConfig, WsConnection, WsHandler, WsSender,
};
use fy_core::{FyError, MarketDataMsg, Quote, Tick};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::codec::{self, Packet, RawQuote, RawTick};
use crate::subscription::SubscriptionSet;

const LABEL: &str = "fyers-md";

type AuthWaiter = oneshot::Sender<Result<(), FyError>>;

/// State that lives for one transport session only.
#[derive(Default)]
struct Session {
    sender: Option<WsSender>,
    /// token → broker symbol, from subscribe acks.
    tokens: AHashMap<u32, String>,
    ack_threshold: u32,
    unacked: u32,
    auth_waiter: Option<AuthWaiter>,
}

/// Everything the session task touches.
struct Shared {
    state: StateCell,
    subscriptions: SubscriptionSet,
    session: Mutex<Session>,
    sink: Sender<MarketDataMsg>,
    last_message_ms: AtomicU64,
}

impl Shared {
    /// Drop per-session state; returns a pending auth waiter, if any.
    fn reset_session(&self) -> Option<AuthWaiter> {
        let mut session = self.session.lock();
        std::mem::take(&mut *session).auth_waiter
    }

    fn open_sender(&self) -> Option<WsSender> {
        if self.state.get() != ChannelState::Open {
            return None;
        }
        self.session.lock().sender.clone()
    }

    fn handle_packet(&self, packet: Packet) {
        match packet {
            Packet::AuthAck {
                success,
                ack_threshold,
            } => self.on_auth_ack(success, ack_threshold),
            Packet::SubscribeAck { tokens } => {
                debug!("[{LABEL}] subscribe ack for {} symbols", tokens.len());
                self.session.lock().tokens.extend(tokens);
            }
            Packet::DataAck { msg_num } => self.on_data_ack(msg_num),
            Packet::Tick(raw) => self.on_tick(raw),
            Packet::Quote(raw) => self.on_quote(raw),
            Packet::Unknown { packet_type } => {
                debug!("[{LABEL}] ignoring packet type {packet_type}");
            }
        }
    }

    fn on_auth_ack(&self, success: bool, ack_threshold: u32) {
        if !success {
            error!("[{LABEL}] authentication rejected");
            if let Some(waiter) = self.session.lock().auth_waiter.take() {
                let _ = waiter.send(Err(FyError::Token(
                    "market-data authentication rejected".into(),
                )));
            }
            return;
        }

        let (sender, waiter) = {
            let mut session = self.session.lock();
            session.ack_threshold = ack_threshold;
            session.unacked = 0;
            (session.sender.clone(), session.auth_waiter.take())
        };
        if !self
            .state
            .transition(ChannelState::Authenticating, ChannelState::Open)
        {
            debug!("[{LABEL}] auth ack outside a handshake, ignoring");
            return;
        }

        let symbols = self.subscriptions.snapshot();
        info!(
            "[{LABEL}] authenticated (ack threshold {ack_threshold}), subscribing {} symbols",
            symbols.len()
        );
        if let Some(sender) = sender {
            if let Err(e) = self.flush(&sender, &symbols) {
                warn!("[{LABEL}] failed to queue initial frames: {e}");
            }
        }
        if let Some(waiter) = waiter {
            let _ = waiter.send(Ok(()));
        }
    }

    /// Full-mode switch plus the complete Subscription Set.
    fn flush(&self, sender: &WsSender, symbols: &[String]) -> anyhow::Result<()> {
        sender.try_send(Outbound::Binary(codec::full_mode_frame()?))?;
        if !symbols.is_empty() {
            for frame in codec::subscribe_frames(symbols)? {
                sender.try_send(Outbound::Binary(frame))?;
            }
        }
        Ok(())
    }

    fn on_data_ack(&self, msg_num: u32) {
        let ack = {
            let mut session = self.session.lock();
            session.unacked += 1;
            if session.ack_threshold > 0 && session.unacked >= session.ack_threshold {
                session.unacked = 0;
                session.sender.clone()
            } else {
                None
            }
        };
        if let Some(sender) = ack {
            if let Err(e) = sender.try_send(Outbound::Binary(codec::ack_frame(msg_num))) {
                warn!("[{LABEL}] ack {msg_num} not sent: {e}");
            }
        }
    }

    fn symbol_for(&self, token: u32) -> Option<String> {
        let symbol = self.session.lock().tokens.get(&token).cloned();
        if symbol.is_none() {
            debug!("[{LABEL}] data for unknown token {token}");
        }
        symbol
    }

    fn on_tick(&self, raw: RawTick) {
        let Some(symbol) = self.symbol_for(raw.token) else {
            return;
        };
        self.emit(MarketDataMsg::Tick(Tick {
            symbol,
            last_price: raw.last_price,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume as u64,
            exchange_time_ms: raw.exchange_time_s as u64 * 1000,
            local_time_ms: time_util::now_ms(),
        }));
    }

    fn on_quote(&self, raw: RawQuote) {
        let Some(symbol) = self.symbol_for(raw.token) else {
            return;
        };
        self.emit(MarketDataMsg::Quote(Quote {
            symbol,
            bid_price: raw.bid_price,
            ask_price: raw.ask_price,
            bid_size: raw.bid_size as u64,
            ask_size: raw.ask_size as u64,
            exchange_time_ms: raw.exchange_time_s as u64 * 1000,
            local_time_ms: time_util::now_ms(),
        }));
    }

    fn emit(&self, msg: MarketDataMsg) {
        match self.sink.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("[{LABEL}] tick sink full, dropping"),
            Err(TrySendError::Disconnected(_)) => debug!("[{LABEL}] tick sink closed"),
        }
    }
}

impl WsHandler for Shared {
    fn on_binary(&self, data: &[u8]) {
        self.last_message_ms
            .store(time_util::now_ms(), Ordering::Relaxed);
        for packet in codec::decode_message(data) {
            match packet {
                Ok(p) => self.handle_packet(p),
                Err(e) => warn!("[{LABEL}] dropping malformed packet: {e}"),
            }
        }
    }

    fn on_text(&self, text: &str) {
        debug!("[{LABEL}] unexpected text frame: {text}");
    }

    fn on_close(&self, reason: &str) {
        if let Some(waiter) = self.reset_session() {
            let _ = waiter.send(Err(FyError::WebSocket(format!(
                "closed during authentication: {reason}"
            ))));
        }
        if self.state.mark_lost() {
            warn!("[{LABEL}] connection lost: {reason}");
        }
    }
}

/// The broker market-data feed.
pub struct MarketDataChannel {
    config: MarketDataConfig,
    access_token: String,
    shared: Arc<Shared>,
    conn: tokio::sync::Mutex<WsConnection>,
}

impl MarketDataChannel {
    /// Create a disconnected channel that will push ticks and quotes into
    /// `sink`.
    pub fn new(
        config: MarketDataConfig,
        access_token: impl Into<String>,
        sink: Sender<MarketDataMsg>,
    ) -> Self {
        let ws_config = WsConnConfig {
            url: config.ws_url.clone(),
            extra_headers: Default::default(),
            ping_interval: Some(config.ping_interval()),
            ping_payload: Some(PingPayload::Binary(codec::ping_frame())),
            label: LABEL.into(),
        };
        Self {
            config,
            access_token: access_token.into(),
            shared: Arc::new(Shared {
                state: StateCell::default(),
                subscriptions: SubscriptionSet::new(),
                session: Mutex::new(Session::default()),
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

    /// Open the transport and authenticate.
    ///
    /// Returns once the auth ack arrives, or fails with `Timeout` when the
    /// transport open plus auth exceed the configured connect timeout. A no-op
    /// when the channel is already open.
    pub async fn connect(&self) -> Result<(), FyError> {
        let token = auth::hsm_key(&self.access_token)?;
        let auth_frame = codec::auth_frame(&token, &self.config.source)?;

        let mut conn = self.conn.lock().await;
        if self.is_open() && conn.is_running() {
            return Ok(());
        }

        conn.close().await;
        self.shared.state.set(ChannelState::Connecting);
        let (tx, rx) = oneshot::channel();
        self.shared.reset_session();
        self.shared.session.lock().auth_waiter = Some(tx);

        let timeout = self.config.connect_timeout();
        let started = tokio::time::Instant::now();
        let handler: Arc<dyn WsHandler> = self.shared.clone();
        let sender = match conn.open(handler, timeout).await {
            Ok(sender) => sender,
            Err(e) => {
                self.shared.reset_session();
                self.shared.state.set(ChannelState::Disconnected);
                return Err(e);
            }
        };

        self.shared.session.lock().sender = Some(sender.clone());
        if !self
            .shared
            .state
            .transition(ChannelState::Connecting, ChannelState::Authenticating)
        {
            conn.close().await;
            self.shared.reset_session();
            self.shared.state.set(ChannelState::Disconnected);
            warn!("[{LABEL}] connection lost before authentication");
            return Err(FyError::WebSocket("connection lost before authentication".into()));
        }
        debug!("[{LABEL}] sending auth packet");

        let result = async move {
            sender
                .send(Outbound::Binary(auth_frame))
                .await
                .map_err(|e| FyError::WebSocket(e.to_string()))?;
            let remaining = timeout.saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(FyError::WebSocket(
                    "session ended during authentication".into(),
                )),
                Err(_) => Err(FyError::Timeout(format!(
                    "no auth response within {timeout:?}"
                ))),
            }
        }
        .await;

        if let Err(e) = &result {
            error!("[{LABEL}] connect failed: {e}");
            conn.close().await;
            self.shared.reset_session();
            self.shared.state.set(ChannelState::Disconnected);
        }
        result
    }

    /// Deliberately close the session. Idempotent.
    pub async fn disconnect(&self) {
        let mut conn = self.conn.lock().await;
        self.shared.state.set(ChannelState::Closing);
        conn.close().await;
        self.shared.reset_session();
        self.shared.state.set(ChannelState::Disconnected);
        info!("[{LABEL}] disconnected");
    }

    /// Add symbols to the Subscription Set and send them if the channel is
    /// open. While not open the symbols are queued and sent after auth.
    pub async fn subscribe(&self, symbols: &[String]) -> Result<(), FyError> {
        validate_symbols(symbols)?;
        let added = self.shared.subscriptions.add(symbols);
        if added.is_empty() {
            return Ok(());
        }
        match self.shared.open_sender() {
            Some(sender) => {
                self.send_frames(&sender, codec::subscribe_frames(&added)?)
                    .await;
                info!("[{LABEL}] subscribed {} symbols", added.len());
            }
            None => debug!("[{LABEL}] queued {} symbols until open", added.len()),
        }
        Ok(())
    }

    /// Remove symbols from the Subscription Set.
    pub async fn unsubscribe(&self, symbols: &[String]) -> Result<(), FyError> {
        validate_symbols(symbols)?;
        let removed = self.shared.subscriptions.remove(symbols);
        if removed.is_empty() {
            return Ok(());
        }
        self.shared
            .session
            .lock()
            .tokens
            .retain(|_, symbol| !removed.contains(symbol));
        if let Some(sender) = self.shared.open_sender() {
            self.send_frames(&sender, codec::unsubscribe_frames(&removed)?)
                .await;
            info!("[{LABEL}] unsubscribed {} symbols", removed.len());
        }
        Ok(())
    }

    /// Re-send the complete Subscription Set on the current session.
    ///
    /// Returns the number of symbols sent; zero when the set is empty or the
    /// channel is not open.
    pub async fn resubscribe(&self) -> Result<usize, FyError> {
        let Some(sender) = self.shared.open_sender() else {
            return Ok(0);
        };
        let symbols = self.shared.subscriptions.snapshot();
        if symbols.is_empty() {
            return Ok(0);
        }
        self.send_frames(&sender, codec::subscribe_frames(&symbols)?)
            .await;
        info!("[{LABEL}] resubscribed {} symbols", symbols.len());
        Ok(symbols.len())
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.subscriptions.snapshot()
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.shared.subscriptions.is_empty()
    }

    /// Time since the last inbound frame, `None` before the first one.
    pub fn last_message_age(&self) -> Option<Duration> {
        match self.shared.last_message_ms.load(Ordering::Relaxed) {
            0 => None,
            last => Some(Duration::from_millis(
                time_util::now_ms().saturating_sub(last),
            )),
        }
    }

    async fn send_frames(&self, sender: &WsSender, frames: Vec<Vec<u8>>) {
        for frame in frames {
            if let Err(e) = sender.send(Outbound::Binary(frame)).await {
                // The set still holds the symbols; the next session replays them.
                warn!("[{LABEL}] send failed: {e}");
                return;
            }
        }
    }
}

fn validate_symbols(symbols: &[String]) -> Result<(), FyError> {
    match symbols
        .iter()
        .find(|s| s.is_empty() || s.len() > u8::MAX as usize)
    {
        Some(bad) => Err(FyError::InvalidArgument(format!(
            "invalid broker symbol {bad:?}"
        ))),
        None => Ok(()),
    }
}
