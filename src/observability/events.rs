//! Observable events of the report engine
//!
//! Every lifecycle log line carries an `event` field with one of these
//! names, so logs can be filtered without parsing messages.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    ConfigLoaded,

    // Materialization
    MaterializeScheduled,
    MaterializeStart,
    MaterializePublished,
    /// Output discarded: a newer submission exists for the report
    MaterializeSuperseded,
    /// Nothing to publish (select mode without keys)
    MaterializeSkipped,
    MaterializeFailed,

    // Query
    QueryExecuted,
    QueryRejected,
    DownloadStarted,
    DownloadFailed,

    // Index lifecycle
    IndexCreated,
    IndexEvicted,
    IndexFailed,

    // Compilation
    ConditionSkipped,

    // Definitions
    ReportSaved,
    ReportDeleted,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::MaterializeScheduled => "MATERIALIZE_SCHEDULED",
            Event::MaterializeStart => "MATERIALIZE_START",
            Event::MaterializePublished => "MATERIALIZE_PUBLISHED",
            Event::MaterializeSuperseded => "MATERIALIZE_SUPERSEDED",
            Event::MaterializeSkipped => "MATERIALIZE_SKIPPED",
            Event::MaterializeFailed => "MATERIALIZE_FAILED",
            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::DownloadStarted => "DOWNLOAD_STARTED",
            Event::DownloadFailed => "DOWNLOAD_FAILED",
            Event::IndexCreated => "INDEX_CREATED",
            Event::IndexEvicted => "INDEX_EVICTED",
            Event::IndexFailed => "INDEX_FAILED",
            Event::ConditionSkipped => "CONDITION_SKIPPED",
            Event::ReportSaved => "REPORT_SAVED",
            Event::ReportDeleted => "REPORT_DELETED",
        }
    }

    /// Events that report a failed operation
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::MaterializeFailed
                | Event::QueryRejected
                | Event::DownloadFailed
                | Event::IndexFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
