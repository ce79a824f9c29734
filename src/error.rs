//! Engine-level errors
//!
//! Subsystem errors fold into [`ReportError`], which carries a stable code
//! for callers that map errors onto a transport.

use std::time::Duration;

use thiserror::Error;

use crate::condition::CompileError;
use crate::config::ConfigError;
use crate::pipeline::FormulaError;
use crate::store::StoreError;

/// Result type for engine operations
pub type ReportResult<T> = Result<T, ReportError>;

/// Engine errors
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Store error during {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Formula of field {field_id} failed: {source}")]
    Formula {
        field_id: String,
        #[source]
        source: FormulaError,
    },

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("Materialization queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ReportError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ReportError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Attaches the failed operation to a store error.
    pub fn store(operation: &'static str) -> impl FnOnce(StoreError) -> ReportError {
        move |source| ReportError::Store { operation, source }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::Validation(_) => "REPORT_VALIDATION",
            ReportError::NotFound { .. } => "REPORT_NOT_FOUND",
            ReportError::Store { .. } => "REPORT_STORE_ERROR",
            ReportError::Compile(_) => "REPORT_COMPILE_ERROR",
            ReportError::Formula { .. } => "REPORT_FORMULA_ERROR",
            ReportError::Timeout { .. } => "REPORT_TIMEOUT",
            ReportError::QueueClosed => "REPORT_QUEUE_CLOSED",
            ReportError::Config(_) => "REPORT_CONFIG_ERROR",
        }
    }

    /// Caller errors, as opposed to engine or store failures
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReportError::Validation(_) | ReportError::NotFound { .. } | ReportError::Compile(_)
        )
    }
}
