//! Logging initialization using the `tracing` ecosystem.
//!
//! - Console output (colored, human-readable)
//! - Optional file output with daily rotation via `tracing-appender`
//! - Level from `RUST_LOG`, falling back to the configured level
//!
//! The adapter's components log with a `[component]` prefix
//! (`[fyers-md]`, `[fyers-orders]`, `[fyers-rest]`, `[supervisor]`, ...), so a
//! plain `grep` over the file output isolates one subsystem.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ModuleMeta;

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. Returns the file writer guard when
/// file output is enabled; keep it alive for the lifetime of the process or
/// buffered lines are lost on exit.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: log file prefix (e.g. `"fyers"`)
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(true);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, module_name);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            None
        }
    }
}

/// Initialize logging from the config's module metadata.
///
/// Explicit CLI values win over the config file.
pub fn init_from_meta(
    meta: &ModuleMeta,
    cli_level: Option<&str>,
    cli_dir: Option<&str>,
) -> Option<WorkerGuard> {
    let level = cli_level.or(meta.log_level.as_deref()).unwrap_or("info");
    let dir = cli_dir.or(meta.log_path.as_deref());
    init_logging(level, dir, meta.module_name())
}
