//! Logging initialization, modeled on the CLI's `logging::init()`: an `EnvFilter` read from
//! `RUST_LOG` (default `info`), writing to stdout unless `NANOCLAW_LOG_DIR` names a directory
//! for daily-rotated file logs via `tracing-appender`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Must be kept alive for the process lifetime; dropping it stops the background flush
/// thread `tracing_appender::non_blocking` spawns.
pub struct LogGuard(#[allow(dead_code)] Option<tracing_appender::non_blocking::WorkerGuard>);

pub fn init() -> LogGuard {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match std::env::var("NANOCLAW_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, "nanoclaw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false).with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
            tracing::info!(dir = %dir, "logging to file");
            LogGuard(Some(guard))
        }
        Err(_) => {
            let layer = tracing_subscriber::fmt::layer().with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
            LogGuard(None)
        }
    }
}
