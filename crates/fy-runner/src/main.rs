//! # fy-runner
//!
//! Runs the Fyers brokerage adapter from a JSON config until Ctrl+C.
//!
//! Connects both broker channels, subscribes the configured symbols, and logs
//! every host event and a periodic market-data summary.
//!
//! # Usage
//!
//! ```bash
//! fy-runner config.json --log-level info
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fy_brokerage::{Brokerage, FyersBrokerage};
use fy_core::MarketDataMsg;
use fy_td::SymbolMapper;
use fy_td::event::{BrokerageEvent, MessageLevel};
use tracing::{error, info, warn};

/// Fyers brokerage adapter runner.
#[derive(Parser)]
#[command(name = "fy-runner", about = "Fyers brokerage adapter runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output. Overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,
}

/// Configured symbols the translator accepts; the rest are logged and skipped.
fn valid_subscriptions(symbols: &SymbolMapper, configured: Vec<String>) -> Vec<String> {
    configured
        .into_iter()
        .filter(|symbol| match symbols.to_instrument(symbol, None, None) {
            Ok(_) => true,
            Err(e) => {
                warn!("skipping subscription {symbol}: {e}");
                false
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Configuration, then logging (the config may name the log level)
    let config = fy_core::config::load_config(&cli.config)?;
    let _log_guard = fy_core::logging::init_from_meta(
        &config.meta,
        cli.log_level.as_deref(),
        cli.log_dir.as_deref(),
    );
    info!("fy-runner starting, config={}", cli.config.display());

    // 2. Build the adapter
    let subscriptions = config.brokerage.subscriptions.clone();
    let (tick_tx, tick_rx) =
        crossbeam_channel::bounded(config.brokerage.market_data.sink_capacity);
    let (brokerage, mut events) =
        FyersBrokerage::new(config.brokerage, tick_tx).context("building brokerage")?;

    // 3. Drain host events
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                BrokerageEvent::Order(o) => info!(
                    "order #{} {:?} fill={} @ {} {}",
                    o.host_order_id, o.status, o.fill_quantity, o.fill_price, o.message
                ),
                BrokerageEvent::Message { level, code, text } => match level {
                    MessageLevel::Information => info!("[{code}] {text}"),
                    MessageLevel::Warning => warn!("[{code}] {text}"),
                    MessageLevel::Error => error!("[{code}] {text}"),
                },
                BrokerageEvent::Connected { channel } => info!("{channel} connected"),
                BrokerageEvent::Disconnected { channel, reason } => {
                    warn!("{channel} disconnected: {reason}")
                }
            }
        }
    });

    // 4. Drain market data on a blocking thread
    let tick_task = tokio::task::spawn_blocking(move || {
        let mut count: u64 = 0;
        let mut last_report = std::time::Instant::now();
        loop {
            match tick_rx.recv_timeout(Duration::from_secs(1)) {
                Ok(MarketDataMsg::Tick(t)) => {
                    count += 1;
                    tracing::debug!("{t}");
                }
                Ok(MarketDataMsg::Quote(q)) => {
                    count += 1;
                    tracing::debug!("{q}");
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
            if last_report.elapsed() >= Duration::from_secs(30) {
                info!("market data: {count} message(s) in the last 30s");
                count = 0;
                last_report = std::time::Instant::now();
            }
        }
    });

    // 5. Connect and subscribe
    brokerage.connect().await.context("connecting to broker")?;
    let symbols = valid_subscriptions(brokerage.symbols(), subscriptions);
    if !symbols.is_empty() {
        brokerage.subscribe_symbols(&symbols).await?;
        info!("subscribed {} symbol(s)", symbols.len());
    }

    info!("running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 6. Tear down
    brokerage.disconnect().await;
    drop(brokerage);
    event_task.abort();
    if let Err(e) = tick_task.await {
        error!("market data drain ended abnormally: {e}");
    }

    info!("fy-runner stopped");
    Ok(())
}
