//! Connection supervisor: health checks and backoff reconnects for both
//! broker channels.
//!
//! One health-check task runs on a fixed interval. Each pass looks at every
//! watched channel:
//!
//! - `Disconnected` (and not already reconnecting, not given up): schedule a
//!   reconnect after [`backoff_delay`]. Each scheduled attempt is its own
//!   task; a successful open resets the channel's attempt counter.
//! - `Open` with subscriptions but silent for longer than the staleness
//!   threshold: re-send the subscription set as a liveness probe.
//! - `Connecting` / `Authenticating` / `Closing`: left alone. `Closing` is a
//!   deliberate teardown and never triggers a reconnect.
//!
//! Counters and ceilings are per channel. When a channel's last allowed
//! attempt fails, the host receives exactly one terminal
//! [`DISCONNECT_CODE`] message for it and that channel is never retried again.
//! The other channel keeps its own schedule.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fy_core::FyError;
use fy_core::config::SupervisorConfig;
use fy_core::ws::ChannelState;
use fy_md::MarketDataChannel;
use fy_td::OrderEventChannel;
use fy_td::event::{BrokerageEvent, BrokerageEventSender, DISCONNECT_CODE, MessageLevel};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const MARKET_DATA: &str = "market-data";
pub const ORDER_EVENTS: &str = "order-events";

/// A channel the supervisor can probe and reconnect.
#[async_trait]
pub trait SupervisedChannel: Send + Sync {
    fn name(&self) -> &'static str;

    fn state(&self) -> ChannelState;

    /// Re-open the channel, including its handshake.
    async fn reconnect(&self) -> Result<(), FyError>;

    fn last_message_age(&self) -> Option<Duration> {
        None
    }

    fn has_subscriptions(&self) -> bool {
        false
    }

    /// Re-send the current subscription set.
    async fn resubscribe(&self) -> Result<usize, FyError> {
        Ok(0)
    }
}

#[async_trait]
impl SupervisedChannel for MarketDataChannel {
    fn name(&self) -> &'static str {
        MARKET_DATA
    }

    fn state(&self) -> ChannelState {
        MarketDataChannel::state(self)
    }

    async fn reconnect(&self) -> Result<(), FyError> {
        self.connect().await
    }

    fn last_message_age(&self) -> Option<Duration> {
        MarketDataChannel::last_message_age(self)
    }

    fn has_subscriptions(&self) -> bool {
        MarketDataChannel::has_subscriptions(self)
    }

    async fn resubscribe(&self) -> Result<usize, FyError> {
        MarketDataChannel::resubscribe(self).await
    }
}

#[async_trait]
impl SupervisedChannel for OrderEventChannel {
    fn name(&self) -> &'static str {
        ORDER_EVENTS
    }

    fn state(&self) -> ChannelState {
        OrderEventChannel::state(self)
    }

    async fn reconnect(&self) -> Result<(), FyError> {
        self.connect().await
    }

    fn last_message_age(&self) -> Option<Duration> {
        OrderEventChannel::last_message_age(self)
    }
}

/// Base delay in seconds for a 1-based `attempt`: `2^min(attempt, cap)`.
pub fn backoff_base(attempt: u32, cap: u32) -> f64 {
    2f64.powi(attempt.min(cap) as i32)
}

/// Backoff base scaled by a uniform jitter in `[0.75, 1.25]`.
pub fn backoff_delay(attempt: u32, cap: u32) -> Duration {
    let jitter: f64 = rand::rng().random_range(0.75..=1.25);
    Duration::from_secs_f64(backoff_base(attempt, cap) * jitter)
}

struct Watched {
    channel: Arc<dyn SupervisedChannel>,
    /// `0` retries forever.
    max_attempts: u32,
    attempts: AtomicU32,
    reconnecting: AtomicBool,
    exhausted: AtomicBool,
}

struct Inner {
    watched: RwLock<Vec<Arc<Watched>>>,
    backoff_cap: u32,
    stale_after: Duration,
    health_interval: Duration,
    events: BrokerageEventSender,
    cancel: CancellationToken,
    reconnects: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    async fn check(self: &Arc<Self>) {
        let watched = self.watched.read().clone();
        for entry in watched {
            if self.cancel.is_cancelled() {
                return;
            }
            match entry.channel.state() {
                ChannelState::Disconnected => self.schedule_reconnect(&entry),
                ChannelState::Open => self.probe_staleness(&entry).await,
                ChannelState::Connecting | ChannelState::Authenticating | ChannelState::Closing => {}
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, entry: &Arc<Watched>) {
        if entry.exhausted.load(Ordering::Acquire) {
            return;
        }
        if entry.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }

        let name = entry.channel.name();
        let attempt = entry.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if attempt == 1 {
            let _ = self.events.send(BrokerageEvent::Disconnected {
                channel: name,
                reason: "connection lost".into(),
            });
        }
        let delay = backoff_delay(attempt, self.backoff_cap);
        info!(
            "[supervisor] {name}: reconnect attempt {attempt}/{} in {delay:.1?}",
            entry.max_attempts
        );

        let inner = Arc::clone(self);
        let entry = Arc::clone(entry);
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = inner.cancel.cancelled() => None,
                r = async {
                    tokio::time::sleep(delay).await;
                    entry.channel.reconnect().await
                } => Some(r),
            };
            match result {
                None => {}
                Some(Ok(())) => {
                    entry.attempts.store(0, Ordering::Release);
                    info!("[supervisor] {name}: reconnected after {attempt} attempt(s)");
                    let _ = inner.events.send(BrokerageEvent::Connected { channel: name });
                }
                Some(Err(e)) => {
                    warn!("[supervisor] {name}: reconnect attempt {attempt} failed: {e}");
                    if entry.max_attempts > 0 && attempt >= entry.max_attempts {
                        inner.give_up(&entry, attempt);
                    }
                }
            }
            entry.reconnecting.store(false, Ordering::Release);
        });

        let mut tasks = self.reconnects.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn give_up(&self, entry: &Watched, attempts: u32) {
        if entry.exhausted.swap(true, Ordering::AcqRel) {
            return;
        }
        let name = entry.channel.name();
        error!("[supervisor] {name}: giving up after {attempts} reconnect attempts");
        let _ = self.events.send(BrokerageEvent::message(
            MessageLevel::Error,
            DISCONNECT_CODE,
            format!("{name} connection lost after {attempts} reconnect attempts; restart required"),
        ));
    }

    async fn probe_staleness(&self, entry: &Watched) {
        if !entry.channel.has_subscriptions() {
            return;
        }
        let Some(age) = entry.channel.last_message_age() else {
            return;
        };
        if age <= self.stale_after {
            return;
        }
        let name = entry.channel.name();
        warn!("[supervisor] {name}: no message for {age:.0?}, re-sending subscriptions");
        if let Err(e) = entry.channel.resubscribe().await {
            warn!("[supervisor] {name}: resubscribe failed: {e}");
        }
    }
}

/// Watches channels and reconnects them with exponential backoff.
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
    health: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub fn new(config: &SupervisorConfig, events: BrokerageEventSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                watched: RwLock::new(Vec::new()),
                backoff_cap: config.backoff_exponent_cap,
                stale_after: config.stale_after(),
                health_interval: config.health_check_interval(),
                events,
                cancel: CancellationToken::new(),
                reconnects: Mutex::new(Vec::new()),
            }),
            health: Mutex::new(None),
        }
    }

    /// Add a channel with its own attempt ceiling (`0` = unlimited).
    pub fn watch(&self, channel: Arc<dyn SupervisedChannel>, max_attempts: u32) {
        self.inner.watched.write().push(Arc::new(Watched {
            channel,
            max_attempts,
            attempts: AtomicU32::new(0),
            reconnecting: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
        }));
    }

    /// Spawn the health-check task. A second call is a no-op.
    pub fn start(&self) {
        let mut health = self.health.lock();
        if health.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *health = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.health_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = ticker.tick() => inner.check().await,
                }
            }
        }));
        info!(
            "[supervisor] started, health check every {:?}",
            self.inner.health_interval
        );
    }

    /// Run one health-check pass now.
    pub async fn check_now(&self) {
        self.inner.check().await;
    }

    /// Cancel the health check and every pending reconnect. Idempotent.
    pub fn stop(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        if let Some(handle) = self.health.lock().take() {
            handle.abort();
        }
        for handle in self.inner.reconnects.lock().drain(..) {
            handle.abort();
        }
        info!("[supervisor] stopped");
    }

    /// Scheduled attempts since the channel was last open.
    pub fn attempts(&self, name: &str) -> Option<u32> {
        self.find(name)
            .map(|w| w.attempts.load(Ordering::Acquire))
    }

    /// Whether the channel hit its ceiling and will not be retried.
    pub fn is_exhausted(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|w| w.exhausted.load(Ordering::Acquire))
    }

    fn find(&self, name: &str) -> Option<Arc<Watched>> {
        self.inner
            .watched
            .read()
            .iter()
            .find(|w| w.channel.name() == name)
            .cloned()
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use fy_td::event::{self, BrokerageEventReceiver};

    struct FakeChannel {
        name: &'static str,
        state: Mutex<ChannelState>,
        /// Scripted reconnect outcomes; an empty script fails.
        outcomes: Mutex<VecDeque<bool>>,
        calls: AtomicU32,
        subscribed: bool,
        age: Option<Duration>,
        resubscribes: AtomicU32,
    }

    impl FakeChannel {
        fn new(name: &'static str, state: ChannelState, outcomes: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                name,
                state: Mutex::new(state),
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                calls: AtomicU32::new(0),
                subscribed: false,
                age: None,
                resubscribes: AtomicU32::new(0),
            })
        }

        /// An open channel with a given silence and subscription state.
        fn feed(name: &'static str, subscribed: bool, age: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                state: Mutex::new(ChannelState::Open),
                outcomes: Mutex::new(VecDeque::new()),
                calls: AtomicU32::new(0),
                subscribed,
                age: Some(age),
                resubscribes: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SupervisedChannel for FakeChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn state(&self) -> ChannelState {
            *self.state.lock()
        }

        async fn reconnect(&self) -> Result<(), FyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.outcomes.lock().pop_front().unwrap_or(false);
            if ok {
                *self.state.lock() = ChannelState::Open;
                Ok(())
            } else {
                Err(FyError::WebSocket("refused".into()))
            }
        }

        fn last_message_age(&self) -> Option<Duration> {
            self.age
        }

        fn has_subscriptions(&self) -> bool {
            self.subscribed
        }

        async fn resubscribe(&self) -> Result<usize, FyError> {
            self.resubscribes.fetch_add(1, Ordering::SeqCst);
            Ok(3)
        }
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            health_check_secs: 1,
            stale_after_secs: 30,
            backoff_exponent_cap: 6,
            ..Default::default()
        }
    }

    fn terminal_messages(rx: &mut BrokerageEventReceiver) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let BrokerageEvent::Message { code, text, .. } = ev {
                if code == DISCONNECT_CODE {
                    out.push(text);
                }
            }
        }
        out
    }

    #[test]
    fn backoff_stays_within_jitter_bounds() {
        for attempt in 1..=10u32 {
            let base = 2f64.powi(attempt.min(6) as i32);
            for _ in 0..200 {
                let d = backoff_delay(attempt, 6).as_secs_f64();
                assert!(d >= base * 0.75 - 1e-9 && d <= base * 1.25 + 1e-9, "a={attempt} d={d}");
            }
        }
        assert_eq!(backoff_base(10, 6), 64.0);
        assert_eq!(backoff_base(1, 6), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_stops_retries_and_reports_once() {
        let (tx, mut rx) = event::channel();
        let sup = ConnectionSupervisor::new(&config(), tx);
        let md = FakeChannel::new(MARKET_DATA, ChannelState::Disconnected, &[]);
        sup.watch(md.clone(), 3);
        sup.start();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(md.calls(), 3);
        assert!(sup.is_exhausted(MARKET_DATA));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(md.calls(), 3);
        let terminal = terminal_messages(&mut rx);
        assert_eq!(terminal.len(), 1);
        assert!(terminal[0].contains(MARKET_DATA));
        sup.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_counter() {
        let (tx, mut rx) = event::channel();
        let sup = ConnectionSupervisor::new(&config(), tx);
        let orders = FakeChannel::new(ORDER_EVENTS, ChannelState::Disconnected, &[false, false, true]);
        sup.watch(orders.clone(), 3);
        sup.start();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(orders.calls(), 3);
        assert_eq!(sup.attempts(ORDER_EVENTS), Some(0));
        assert!(!sup.is_exhausted(ORDER_EVENTS));

        let mut connected = 0;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                BrokerageEvent::Connected { channel } => {
                    assert_eq!(channel, ORDER_EVENTS);
                    connected += 1;
                }
                BrokerageEvent::Message { code, .. } => assert_ne!(code, DISCONNECT_CODE),
                _ => {}
            }
        }
        assert_eq!(connected, 1);
        sup.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn channels_have_independent_ceilings() {
        let (tx, mut rx) = event::channel();
        let sup = ConnectionSupervisor::new(&config(), tx);
        let md = FakeChannel::new(MARKET_DATA, ChannelState::Disconnected, &[]);
        let orders = FakeChannel::new(ORDER_EVENTS, ChannelState::Disconnected, &[false, false, true]);
        sup.watch(md.clone(), 2);
        sup.watch(orders.clone(), 5);
        sup.start();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(md.calls(), 2);
        assert!(sup.is_exhausted(MARKET_DATA));
        assert_eq!(orders.calls(), 3);
        assert_eq!(orders.state(), ChannelState::Open);
        assert!(!sup.is_exhausted(ORDER_EVENTS));
        assert_eq!(terminal_messages(&mut rx).len(), 1);
        sup.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_reconnect() {
        let (tx, _rx) = event::channel();
        let sup = ConnectionSupervisor::new(&config(), tx);
        let md = FakeChannel::new(MARKET_DATA, ChannelState::Disconnected, &[true]);
        sup.watch(md.clone(), 3);
        sup.start();

        // First pass schedules attempt 1, at least 1.5s out.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sup.attempts(MARKET_DATA), Some(1));
        sup.stop();
        sup.stop();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(md.calls(), 0);
    }

    #[tokio::test]
    async fn closing_and_open_channels_are_not_reconnected() {
        let (tx, _rx) = event::channel();
        let sup = ConnectionSupervisor::new(&config(), tx);
        let closing = FakeChannel::new(MARKET_DATA, ChannelState::Closing, &[]);
        let open = FakeChannel::new(ORDER_EVENTS, ChannelState::Open, &[]);
        sup.watch(closing.clone(), 3);
        sup.watch(open.clone(), 3);

        sup.check_now().await;
        assert_eq!(sup.attempts(MARKET_DATA), Some(0));
        assert_eq!(sup.attempts(ORDER_EVENTS), Some(0));
    }

    #[tokio::test]
    async fn stale_feed_is_probed_with_resubscribe() {
        let (tx, _rx) = event::channel();
        let sup = ConnectionSupervisor::new(&config(), tx);

        let stale = FakeChannel::feed(MARKET_DATA, true, Duration::from_secs(120));
        let fresh = FakeChannel::feed("fresh", true, Duration::from_secs(5));
        let idle = FakeChannel::feed("idle", false, Duration::from_secs(120));
        sup.watch(stale.clone(), 3);
        sup.watch(fresh.clone(), 3);
        sup.watch(idle.clone(), 3);

        sup.check_now().await;
        assert_eq!(stale.resubscribes.load(Ordering::SeqCst), 1);
        assert_eq!(fresh.resubscribes.load(Ordering::SeqCst), 0);
        assert_eq!(idle.resubscribes.load(Ordering::SeqCst), 0);
        assert_eq!(stale.calls(), 0);
    }
}
