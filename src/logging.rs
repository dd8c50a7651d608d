//! Tracing subscriber setup: a non-blocking file appender layered
//! alongside a human-readable stdout layer.

use crate::config::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global tracing subscriber.
///
/// Returns a [`WorkerGuard`] that must be kept alive for the duration of
/// the process — dropping it flushes and stops the non-blocking writer.
pub fn init_logging(config: &Config) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily("logs", "swaprail.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = format!("{}", config.log_level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_writer(non_blocking)
        .with_ansi(false);
    let stdout_layer = fmt::layer().with_target(false).with_ansi(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}
