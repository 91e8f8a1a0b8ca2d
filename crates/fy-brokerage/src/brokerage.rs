//! The host-facing brokerage facade.
//!
//! [`FyersBrokerage`] composes every piece of the adapter:
//!
//! ```text
//! FyersBrokerage
//! ├── RestClient            (shared by gateway, history, account queries)
//! ├── SymbolMapper          (shared translator)
//! ├── OrderGateway          (place / modify / cancel, fill reconciliation)
//! ├── MarketDataChannel     (ticks → crossbeam sink)
//! ├── OrderEventChannel     (pushes → OrderGateway)
//! ├── HistoryDownloader
//! └── Session               (per connect: supervisor + order-book poller)
//! ```
//!
//! Everything a session owns is created by [`Brokerage::connect`] and torn
//! down by [`Brokerage::disconnect`]; nothing lives in statics, so several
//! instances can run side by side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::Sender;
use fy_core::config::BrokerageConfig;
use fy_core::{
    Bar, CashAmount, FyError, Holding, InputOrder, Instrument, MarketDataMsg, OpenOrder,
};
use fy_md::MarketDataChannel;
use fy_td::event::{self, BrokerageEvent, BrokerageEventReceiver, BrokerageEventSender, MessageLevel, SESSION_EXPIRED_CODE};
use fy_td::{OrderEventChannel, OrderEventSink, OrderGateway, RestClient, SymbolMapper};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::history::{self, HistoryDownloader, HistoryRequest};
use crate::supervisor::{ConnectionSupervisor, MARKET_DATA, ORDER_EVENTS};

/// Funds-report line holding the available cash.
const AVAILABLE_BALANCE_ID: i64 = 10;
const CURRENCY: &str = "INR";

/// Host-facing brokerage contract.
///
/// Order methods report broker rejections through order events and return
/// `false`; they never fail with an error.
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Open both channels and start supervising them.
    async fn connect(&self) -> Result<(), FyError>;

    /// Stop supervision and close both channels. Idempotent.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    async fn place_order(&self, order: &InputOrder) -> bool;

    async fn update_order(&self, order: &InputOrder) -> bool;

    async fn cancel_order(&self, host_order_id: u64) -> bool;

    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>, FyError>;

    async fn get_account_holdings(&self) -> Result<Vec<Holding>, FyError>;

    async fn get_cash_balance(&self) -> Result<Vec<CashAmount>, FyError>;

    async fn subscribe(&self, instruments: &[Instrument]) -> Result<(), FyError>;

    async fn unsubscribe(&self, instruments: &[Instrument]) -> Result<(), FyError>;

    /// `Ok(None)` for requests the broker does not serve.
    async fn get_history(&self, request: &HistoryRequest) -> Result<Option<Vec<Bar>>, FyError>;
}

struct Session {
    supervisor: ConnectionSupervisor,
    cancel: CancellationToken,
    poller: Option<JoinHandle<()>>,
}

pub struct FyersBrokerage {
    config: BrokerageConfig,
    rest: Arc<RestClient>,
    symbols: Arc<SymbolMapper>,
    gateway: Arc<OrderGateway>,
    market_data: Arc<MarketDataChannel>,
    order_events: Arc<OrderEventChannel>,
    history: HistoryDownloader,
    events: BrokerageEventSender,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl FyersBrokerage {
    /// Build a disconnected brokerage. Ticks and quotes go to `tick_sink`;
    /// everything else arrives on the returned event receiver.
    pub fn new(
        config: BrokerageConfig,
        tick_sink: Sender<MarketDataMsg>,
    ) -> Result<(Self, BrokerageEventReceiver), FyError> {
        config.validate()?;
        let (events, rx) = event::channel();

        let rest = Arc::new(RestClient::new(&config)?);
        let expiry_events = events.clone();
        rest.set_session_expiry_callback(Arc::new(move |err: &FyError| {
            let _ = expiry_events.send(BrokerageEvent::message(
                MessageLevel::Error,
                SESSION_EXPIRED_CODE,
                format!("broker rejected the session credential: {err}"),
            ));
        }));

        let symbols = Arc::new(SymbolMapper::new());
        let gateway = Arc::new(OrderGateway::new(
            rest.clone(),
            symbols.clone(),
            events.clone(),
        ));
        let market_data = Arc::new(MarketDataChannel::new(
            config.market_data.clone(),
            config.access_token.clone(),
            tick_sink,
        ));
        let sink: Arc<dyn OrderEventSink> = gateway.clone();
        let order_events = Arc::new(OrderEventChannel::new(
            config.order_events.clone(),
            &config.auth_header(),
            sink,
        ));
        let history = HistoryDownloader::new(rest.clone(), symbols.clone());

        let brokerage = Self {
            config,
            rest,
            symbols,
            gateway,
            market_data,
            order_events,
            history,
            events,
            session: tokio::sync::Mutex::new(None),
        };
        Ok((brokerage, rx))
    }

    pub fn symbols(&self) -> &SymbolMapper {
        &self.symbols
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Subscribe broker symbols directly, bypassing translation.
    pub async fn subscribe_symbols(&self, symbols: &[String]) -> Result<(), FyError> {
        self.market_data.subscribe(symbols).await
    }

    fn translate(&self, instruments: &[Instrument]) -> Result<Vec<String>, FyError> {
        instruments
            .iter()
            .map(|i| self.symbols.to_broker_symbol(i))
            .collect()
    }

    fn spawn_order_poller(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let secs = self.config.order_events.order_poll_secs;
        if secs == 0 {
            return None;
        }
        let gateway = self.gateway.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = gateway.reconcile_order_book().await {
                            warn!("[fyers-orders] order book poll failed: {e}");
                        }
                    }
                }
            }
        }))
    }

    async fn teardown_channels(&self) {
        self.market_data.disconnect().await;
        self.order_events.disconnect().await;
    }
}

#[async_trait]
impl Brokerage for FyersBrokerage {
    async fn connect(&self) -> Result<(), FyError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let profile = self.rest.profile().await?;
        info!("[fyers] session valid for {} ({})", profile.fy_id, profile.name);

        if let Err(e) = self.market_data.connect().await {
            self.teardown_channels().await;
            return Err(e);
        }
        let _ = self.events.send(BrokerageEvent::Connected {
            channel: MARKET_DATA,
        });
        if let Err(e) = self.order_events.connect().await {
            self.teardown_channels().await;
            return Err(e);
        }
        let _ = self.events.send(BrokerageEvent::Connected {
            channel: ORDER_EVENTS,
        });

        let supervisor = ConnectionSupervisor::new(&self.config.supervisor, self.events.clone());
        supervisor.watch(
            self.market_data.clone(),
            self.config.supervisor.market_data_max_attempts,
        );
        supervisor.watch(
            self.order_events.clone(),
            self.config.supervisor.order_events_max_attempts,
        );
        supervisor.start();

        let cancel = CancellationToken::new();
        let poller = self.spawn_order_poller(cancel.clone());
        *session = Some(Session {
            supervisor,
            cancel,
            poller,
        });
        info!("[fyers] connected");
        Ok(())
    }

    async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        let Some(s) = session.take() else {
            return;
        };
        // Supervisor first, so the closing channels are not reconnected.
        s.supervisor.stop();
        s.cancel.cancel();
        if let Some(poller) = s.poller {
            poller.abort();
        }
        self.teardown_channels().await;
        info!("[fyers] disconnected");
    }

    fn is_connected(&self) -> bool {
        self.market_data.is_open() && self.order_events.is_open()
    }

    async fn place_order(&self, order: &InputOrder) -> bool {
        self.gateway.place_order(order).await
    }

    async fn update_order(&self, order: &InputOrder) -> bool {
        self.gateway.update_order(order).await
    }

    async fn cancel_order(&self, host_order_id: u64) -> bool {
        self.gateway.cancel_order(host_order_id).await
    }

    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>, FyError> {
        self.gateway.get_open_orders().await
    }

    async fn get_account_holdings(&self) -> Result<Vec<Holding>, FyError> {
        let mut out = Vec::new();
        for row in self.rest.holdings().await? {
            match self.symbols.to_instrument(&row.symbol, None, None) {
                Ok(instrument) => out.push(Holding {
                    instrument,
                    quantity: row.quantity,
                    average_price: row.cost_price,
                    market_price: row.ltp,
                    unrealized_pnl: row.pl,
                }),
                Err(e) => warn!("[fyers] skipping holding {}: {e}", row.symbol),
            }
        }
        for row in self.rest.positions().await? {
            if row.net_qty == 0.0 {
                continue;
            }
            match self.symbols.to_instrument(&row.symbol, None, None) {
                Ok(instrument) => out.push(Holding {
                    instrument,
                    quantity: row.net_qty,
                    average_price: row.net_avg,
                    market_price: row.ltp,
                    unrealized_pnl: row.pl,
                }),
                Err(e) => warn!("[fyers] skipping position {}: {e}", row.symbol),
            }
        }
        Ok(out)
    }

    async fn get_cash_balance(&self) -> Result<Vec<CashAmount>, FyError> {
        let funds = self.rest.funds().await?;
        let available = funds.iter().find(|f| {
            f.id == AVAILABLE_BALANCE_ID || f.title.eq_ignore_ascii_case("Available Balance")
        });
        Ok(available
            .map(|f| CashAmount {
                currency: CURRENCY.to_string(),
                amount: f.equity_amount,
            })
            .into_iter()
            .collect())
    }

    async fn subscribe(&self, instruments: &[Instrument]) -> Result<(), FyError> {
        let symbols = self.translate(instruments)?;
        self.market_data.subscribe(&symbols).await
    }

    async fn unsubscribe(&self, instruments: &[Instrument]) -> Result<(), FyError> {
        let symbols = self.translate(instruments)?;
        self.market_data.unsubscribe(&symbols).await
    }

    async fn get_history(&self, request: &HistoryRequest) -> Result<Option<Vec<Bar>>, FyError> {
        if let Err(e) = history::check_supported(request) {
            warn!("[fyers] history request for {} skipped: {e}", request.instrument);
            let _ = self
                .events
                .send(BrokerageEvent::warning("HistoryUnsupported", e.to_string()));
            return Ok(None);
        }
        self.history.download(request).await
    }
}
