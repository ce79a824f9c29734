//! Counters for the report engine
//!
//! - Counters only, monotonic
//! - Thread-safe, lock-free
//! - One registry per tenant, passed explicitly

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    materializations_published: AtomicU64,
    materializations_failed: AtomicU64,
    materializations_superseded: AtomicU64,
    materializations_skipped: AtomicU64,
    rows_materialized: AtomicU64,
    queries_executed: AtomicU64,
    queries_rejected: AtomicU64,
    rows_returned: AtomicU64,
    indexes_created: AtomicU64,
    indexes_evicted: AtomicU64,
    index_failures: AtomicU64,
    conditions_skipped: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Materialization

    pub fn record_published(&self, rows: u64) {
        self.materializations_published.fetch_add(1, Ordering::Relaxed);
        self.rows_materialized.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_materialize_failures(&self) {
        self.materializations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_superseded(&self) {
        self.materializations_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.materializations_skipped.fetch_add(1, Ordering::Relaxed);
    }

    // Query

    pub fn record_query(&self, rows: u64) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        self.rows_returned.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Index lifecycle

    pub fn increment_indexes_created(&self) {
        self.indexes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_indexes_evicted(&self, count: u64) {
        self.indexes_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_index_failures(&self) {
        self.index_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Compilation

    pub fn add_conditions_skipped(&self, count: u64) {
        self.conditions_skipped.fetch_add(count, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            materializations_published: load(&self.materializations_published),
            materializations_failed: load(&self.materializations_failed),
            materializations_superseded: load(&self.materializations_superseded),
            materializations_skipped: load(&self.materializations_skipped),
            rows_materialized: load(&self.rows_materialized),
            queries_executed: load(&self.queries_executed),
            queries_rejected: load(&self.queries_rejected),
            rows_returned: load(&self.rows_returned),
            indexes_created: load(&self.indexes_created),
            indexes_evicted: load(&self.indexes_evicted),
            index_failures: load(&self.index_failures),
            conditions_skipped: load(&self.conditions_skipped),
        }
    }
}

/// Snapshot of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub materializations_published: u64,
    pub materializations_failed: u64,
    pub materializations_superseded: u64,
    pub materializations_skipped: u64,
    pub rows_materialized: u64,
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub rows_returned: u64,
    pub indexes_created: u64,
    pub indexes_evicted: u64,
    pub index_failures: u64,
    pub conditions_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_published_adds_rows() {
        let metrics = MetricsRegistry::new();
        metrics.record_published(10);
        metrics.record_published(5);
        let snap = metrics.snapshot();
        assert_eq!(snap.materializations_published, 2);
        assert_eq!(snap.rows_materialized, 15);
    }

    #[test]
    fn test_index_counters() {
        let metrics = MetricsRegistry::new();
        metrics.increment_indexes_created();
        metrics.add_indexes_evicted(3);
        metrics.increment_index_failures();
        let snap = metrics.snapshot();
        assert_eq!(snap.indexes_created, 1);
        assert_eq!(snap.indexes_evicted, 3);
        assert_eq!(snap.index_failures, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = MetricsRegistry::new();
        metrics.record_query(7);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["queries_executed"], 1);
        assert_eq!(json["rows_returned"], 7);
    }
}
