//! Logging setup.
//!
//! One `tracing` subscriber for the whole run, filtered through `RUST_LOG`
//! with an `info` default. Output goes to stdout, or to daily-rolling files
//! under the configured log directory when `log_to_file` is set.

use crate::config::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_DIRECTIVE: &str = "info";
const LOG_FILE_PREFIX: &str = "vulnfeeds.log";

/// Install the global subscriber for this run.
///
/// The returned guard owns the file appender's flush worker; hold it in
/// `main` for the lifetime of the program or buffered lines may be lost on
/// exit. Runs logging to stdout return `None`.
pub fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_to_file {
        let appender = rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .init();
        Some(guard)
    } else {
        registry.with(fmt::layer().with_target(false)).init();
        None
    }
}
