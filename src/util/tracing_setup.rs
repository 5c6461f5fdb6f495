//! Tracing/logging initialization

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install a global tracing subscriber from configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already set, which is common when the host application
/// configures logging itself.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            subscriber.with(fmt_layer).try_init()
        }
        _ => {
            let fmt_layer = fmt::layer().with_target(true);
            subscriber.with(fmt_layer).try_init()
        }
    }
    .context("Failed to install tracing subscriber")?;

    Ok(())
}
