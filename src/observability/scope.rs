//! ObservationScope for begin/complete logging around an operation
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` with `elapsed_ms` on `complete()`
//! - Logs `{name}_FAILED` on `fail()`
//! - Logs `{name}_INCOMPLETE` if dropped without either

use std::time::Instant;

use tracing::{error, info, warn};

/// A scope that logs the lifecycle of one operation
///
/// ```ignore
/// let scope = ObservationScope::new("MATERIALIZE", report_id.as_str());
/// // ... do work ...
/// scope.complete(rows);
/// ```
pub struct ObservationScope {
    name: &'static str,
    subject: String,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    /// Logs `{name}_BEGIN` for `subject`.
    pub fn new(name: &'static str, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        info!(event = %format!("{}_BEGIN", name), subject = %subject);
        Self {
            name,
            subject,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Logs `{name}_COMPLETE` with the number of rows produced.
    pub fn complete(mut self, rows: u64) {
        self.finished = true;
        info!(
            event = %format!("{}_COMPLETE", self.name),
            subject = %self.subject,
            rows,
            elapsed_ms = self.elapsed_ms(),
        );
    }

    /// Logs `{name}_FAILED` with the reason.
    pub fn fail(mut self, reason: &dyn std::fmt::Display) {
        self.finished = true;
        error!(
            event = %format!("{}_FAILED", self.name),
            subject = %self.subject,
            reason = %reason,
            elapsed_ms = self.elapsed_ms(),
        );
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                event = %format!("{}_INCOMPLETE", self.name),
                subject = %self.subject,
                reason = "scope dropped without completion",
            );
        }
    }
}
