//! Tracing subscriber setup
//!
//! Installs a global `tracing` subscriber: an `EnvFilter` (`RUST_LOG`
//! overrides the configured level) and a JSON or human-readable `fmt` layer
//! writing to stderr. Library code only emits events; only the binary
//! installs a subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use super::{ObservabilityError, ObservabilityResult};
use crate::config::{LogConfig, LogFormat};

/// Builds the level filter: `RUST_LOG` when set, else the configured level.
pub fn env_filter(config: &LogConfig) -> ObservabilityResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ObservabilityError::new(format!("invalid log level '{}': {}", config.level, e))),
    }
}

/// Installs the global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> ObservabilityResult<()> {
    let filter = env_filter(config)?;
    let registry = Registry::default().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| ObservabilityError::new(format!("tracing already initialized: {}", e)))
}
