//! Logging setup
//!
//! Console logging goes to stderr so the stdout event stream stays
//! machine-readable; the run log is written inside the Working Root via a
//! non-blocking file appender. The returned guard must be held for the
//! duration of the run so buffered lines are flushed on every exit path,
//! including fatal ones.

use crate::error::{Result, SetupError};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber with a stderr layer plus a plain-text
/// `log.txt` file layer inside `root`.
///
/// `debug_mode` raises the default level; `RUST_LOG` still overrides.
pub fn init(root: &Path, debug_mode: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let file = std::fs::File::create(root.join("log.txt"))
        .map_err(|e| SetupError::config(format!("cannot create run log: {}", e)))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let default_level = if debug_mode { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!("logging initialized, run log at {}", root.join("log.txt").display());
    Ok(guard)
}

/// Console-only subscriber for commands that have no Working Root
/// (validation, EULA display).
pub fn init_console(debug_mode: bool) {
    let default_level = if debug_mode { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
