//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{WorkbenchError, WorkbenchResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the configured filter.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> WorkbenchResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| WorkbenchError::Config(format!("logging.filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(config.ansi)
                .with_target(config.with_target),
        )
        .try_init()
        .map_err(|e| WorkbenchError::Config(e.to_string()))
}
