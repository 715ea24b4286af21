//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the directive the
//! caller passes (e.g. "info" or "conveyor_scheduler=debug").

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialise the global tracing subscriber.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing(default_directive: &str, format: LogFormat) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("failed to initialise tracing: {}", e))
}
