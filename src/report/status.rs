//! Materialization status of a report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the latest materialization of a report stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationState {
    /// Never materialized
    #[default]
    Pending,
    Scheduled,
    Running,
    Published,
    /// Nothing to publish (select mode without keys)
    Skipped,
    /// A newer submission replaced this run's output
    Superseded,
    Failed,
}

impl MaterializationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MaterializationState::Published
                | MaterializationState::Skipped
                | MaterializationState::Superseded
                | MaterializationState::Failed
        )
    }
}

/// Status record, kept by the queue and persisted on the definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterializationStatus {
    #[serde(default)]
    pub state: MaterializationState,
    /// Generation the state refers to
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub last_materialized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Rows published by the last successful run
    #[serde(default)]
    pub rows: u64,
}

impl MaterializationStatus {
    pub fn scheduled(generation: u64, previous: &MaterializationStatus) -> Self {
        Self {
            state: MaterializationState::Scheduled,
            generation,
            ..previous.clone()
        }
    }

    pub fn published(generation: u64, rows: u64, at: DateTime<Utc>) -> Self {
        Self {
            state: MaterializationState::Published,
            generation,
            last_materialized_at: Some(at),
            last_error: None,
            rows,
        }
    }

    /// Failed run; the previous output and its timestamp stay valid.
    pub fn failed(generation: u64, error: String, previous: &MaterializationStatus) -> Self {
        Self {
            state: MaterializationState::Failed,
            generation,
            last_error: Some(error),
            ..previous.clone()
        }
    }

    pub fn with_state(mut self, state: MaterializationState) -> Self {
        self.state = state;
        self
    }

    pub fn at_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_keeps_previous_output_info() {
        let at = Utc::now();
        let published = MaterializationStatus::published(1, 10, at);
        let failed = MaterializationStatus::failed(2, "boom".into(), &published);
        assert_eq!(failed.state, MaterializationState::Failed);
        assert_eq!(failed.generation, 2);
        assert_eq!(failed.rows, 10);
        assert_eq!(failed.last_materialized_at, Some(at));
        assert_eq!(failed.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_default_is_pending() {
        let status: MaterializationStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status.state, MaterializationState::Pending);
        assert!(!status.state.is_terminal());
    }
}
