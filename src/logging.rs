//! Tracing setup: compact stdout output plus a daily-rotating log file.
//!
//! `RUST_LOG` controls filtering (default "info"), e.g.
//! `RUST_LOG=seowatch=debug,reqwest=warn`.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the subscriber. The returned guard must be kept alive for the
/// process lifetime or buffered file output is dropped on exit.
pub fn init_logging<P: AsRef<Path>>(
    log_dir: P,
) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "seowatch.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_ansi(false)
        .compact();

    let stdout_layer = fmt::layer().with_target(false).compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    tracing::info!(dir = %log_dir.display(), "logging initialized");
    Ok(guard)
}
