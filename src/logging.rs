//! Console logging setup.
//!
//! Logs go to stderr so stdout stays free for JSON reports. `RUST_LOG`
//! overrides the default level.

use std::io;

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. `verbose` lowers the default level to debug.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_thread_names(verbose)
            .with_timer(LocalTimeTimer),
    );
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to set default subscriber: {e}"))?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct LocalTimeTimer;

impl fmt::time::FormatTime for LocalTimeTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"))
    }
}
