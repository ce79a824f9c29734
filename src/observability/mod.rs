//! Observability for the report engine
//!
//! - Structured logging through `tracing`, every lifecycle line tagged with
//!   an [`Event`]
//! - Scoped begin/complete logging ([`ObservationScope`])
//! - Counters ([`MetricsRegistry`])
//!
//! # Principles
//!
//! 1. Observability is read-only: it never changes execution
//! 2. No global registries: metrics are owned by the tenant
//! 3. Only the binary installs a subscriber ([`init_tracing`])

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{env_filter, init_tracing};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

use thiserror::Error;

/// Observability setup failure; never fatal to request handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[REPORT_OBSERVABILITY_FAILED] {message}")]
pub struct ObservabilityError {
    message: String,
}

impl ObservabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for observability operations
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;
