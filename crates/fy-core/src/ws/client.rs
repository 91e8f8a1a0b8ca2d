//! Single WebSocket session with ping keep-alive.
//!
//! Each `WsConnection` runs one transport session as a tokio task that:
//! 1. Connects to the broker WebSocket endpoint (optional handshake headers).
//! 2. Reads frames in arrival order and forwards them to a [`WsHandler`].
//! 3. Writes outbound frames queued through a [`WsSender`].
//! 4. Sends periodic ping frames (broker-specific format).
//! 5. Reports an unexpected close through [`WsHandler::on_close`].
//!
//! Reconnecting is *not* done here: the connection supervisor owns retry
//! policy, so a closed session simply ends its task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::{debug, error, info, warn};

use crate::error::FyError;

/// Receives inbound frames and lifecycle notifications for one session.
///
/// Called from the session task; implementations must not block.
pub trait WsHandler: Send + Sync + 'static {
    /// A text frame arrived.
    fn on_text(&self, _text: &str) {}

    /// A binary frame arrived.
    fn on_binary(&self, _data: &[u8]) {}

    /// The session ended without a deliberate close.
    fn on_close(&self, reason: &str);
}

/// Ping payload format: varies by channel.
#[derive(Debug, Clone)]
pub enum PingPayload {
    /// Send a text frame (order socket sends `"ping"`).
    Text(String),
    /// Send a binary frame (market-data socket has its own ping packet).
    Binary(Vec<u8>),
    /// Use the standard WebSocket ping frame.
    WebSocketPing,
}

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL.
    pub url: String,
    /// Extra HTTP headers for the handshake (e.g. `Authorization`).
    pub extra_headers: HashMap<String, String>,
    /// Interval between ping frames.
    pub ping_interval: Option<Duration>,
    /// Ping frame format.
    pub ping_payload: Option<PingPayload>,
    /// Log label (e.g. `"fyers-md"`).
    pub label: String,
}

/// An outbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Binary(Vec<u8>),
}

/// Cloneable handle for queueing frames onto a running session.
#[derive(Debug, Clone)]
pub struct WsSender {
    tx: mpsc::Sender<Outbound>,
}

impl WsSender {
    /// Queue a frame; fails only when the session has ended.
    pub async fn send(&self, frame: Outbound) -> anyhow::Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| anyhow::anyhow!("websocket session closed"))
    }

    /// Queue a frame without waiting; usable from synchronous callbacks.
    pub fn try_send(&self, frame: Outbound) -> anyhow::Result<()> {
        self.tx
            .try_send(frame)
            .map_err(|e| anyhow::anyhow!("websocket outbound queue: {e}"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl From<mpsc::Sender<Outbound>> for WsSender {
    fn from(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }
}

/// A single WebSocket session managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet opened) connection.
    pub fn new(config: WsConnConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Open the transport and start the session task.
    ///
    /// Any previous session is closed first. Waits at most `timeout` for the
    /// WebSocket handshake to complete.
    pub async fn open(
        &mut self,
        handler: Arc<dyn WsHandler>,
        timeout: Duration,
    ) -> Result<WsSender, FyError> {
        self.close().await;

        let label = self.config.label.clone();
        info!("[{label}] connecting to {}", self.config.url);

        let stream = match tokio::time::timeout(timeout, connect_ws(&self.config)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(FyError::WebSocket(format!("{label}: {e}"))),
            Err(_) => {
                return Err(FyError::Timeout(format!(
                    "{label}: websocket open exceeded {timeout:?}"
                )));
            }
        };
        info!("[{label}] transport open");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(256);
        let sender = WsSender { tx: outbound_tx };
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            session_loop(config, stream, handler, outbound_rx, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        Ok(sender)
    }

    /// Whether the session task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Close the session and wait for the task to finish. Idempotent.
    pub async fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Session loop: reads, writes, pings until the stream ends or shutdown.
async fn session_loop(
    config: WsConnConfig,
    stream: WsStream,
    handler: Arc<dyn WsHandler>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let label = config.label.as_str();
    let (mut ws_write, mut ws_read) = stream.split();

    // First ping goes out one interval after open
    let mut ping_interval = config
        .ping_interval
        .map(|d| tokio::time::interval_at(tokio::time::Instant::now() + d, d));

    let reason = loop {
        tokio::select! {
            // Deliberate close: no on_close notification.
            _ = shutdown_rx.changed() => {
                debug!("[{label}] shutdown signal received");
                let _ = ws_write.close().await;
                return;
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handler.on_text(&text),
                    Some(Ok(Message::Binary(data))) => handler.on_binary(&data),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!("[{label}] received close frame: {frame:?}");
                        break "server closed the connection".to_string();
                    }
                    Some(Err(e)) => {
                        error!("[{label}] read error: {e}");
                        break format!("read error: {e}");
                    }
                    None => {
                        warn!("[{label}] stream ended");
                        break "stream ended".to_string();
                    }
                    _ => {} // Pong, Frame: ignore
                }
            }

            Some(frame) = outbound_rx.recv() => {
                let msg = match frame {
                    Outbound::Text(t) => Message::Text(t.into()),
                    Outbound::Binary(b) => Message::Binary(b.into()),
                };
                if let Err(e) = ws_write.send(msg).await {
                    error!("[{label}] send error: {e}");
                    break format!("send error: {e}");
                }
            }

            _ = next_ping(&mut ping_interval) => {
                let ping_msg = match &config.ping_payload {
                    Some(PingPayload::Text(t)) => Message::Text(t.clone().into()),
                    Some(PingPayload::Binary(b)) => Message::Binary(b.clone().into()),
                    Some(PingPayload::WebSocketPing) | None => Message::Ping(Vec::new().into()),
                };
                if let Err(e) = ws_write.send(ping_msg).await {
                    error!("[{label}] ping send error: {e}");
                    break format!("ping send error: {e}");
                }
            }
        }
    };

    handler.on_close(&reason);
}

/// Resolves on the next ping tick; never resolves when pinging is disabled.
async fn next_ping(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Establish a WebSocket connection (TLS when the URL is `wss://`).
async fn connect_ws(config: &WsConnConfig) -> anyhow::Result<WsStream> {
    let mut request = config.url.as_str().into_client_request()?;

    for (key, value) in &config.extra_headers {
        request.headers_mut().insert(
            HeaderName::from_bytes(key.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}
