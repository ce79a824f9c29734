//! Index lifecycle manager
//!
//! Provisions one composite index per query key-set on a materialized
//! collection while keeping the collection within its index budget.
//!
//! # Ranking
//!
//! Indexes are ranked by store access count descending, then by name
//! ascending. Eviction drops from the bottom of the ranking.
//!
//! # Invariants
//!
//! - After `ensure_index` the collection holds at most `budget` indexes
//! - The index serving the requested key-set is never evicted

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ReportError, ReportResult};
use crate::observability::{Event, MetricsRegistry};
use crate::store::{DocumentStore, IndexSpec, IndexUsage};

/// Why a key-set was not indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoKeys,
    TooManyKeys { keys: usize, max: usize },
}

/// Result of [`IndexManager::ensure_index`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A matching index was already there
    Existing { name: String, evicted: Vec<String> },
    Created { name: String, evicted: Vec<String> },
    Skipped(SkipReason),
}

impl IndexOutcome {
    pub fn evicted(&self) -> &[String] {
        match self {
            IndexOutcome::Existing { evicted, .. } | IndexOutcome::Created { evicted, .. } => {
                evicted
            }
            IndexOutcome::Skipped(_) => &[],
        }
    }
}

/// Keeps query indexes of materialized collections within budget
#[derive(Clone)]
pub struct IndexManager {
    store: Arc<dyn DocumentStore>,
    metrics: Arc<MetricsRegistry>,
    budget: usize,
    max_keys: usize,
    timeout: Duration,
}

impl IndexManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        metrics: Arc<MetricsRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            budget: config.index_budget,
            max_keys: config.max_index_keys,
            timeout: config.index_timeout(),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Makes sure an index over `keys` exists on `collection`.
    ///
    /// Duplicate keys are dropped, first occurrence wins.
    pub async fn ensure_index(&self, collection: &str, keys: &[String]) -> ReportResult<IndexOutcome> {
        let mut unique: Vec<&str> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key.as_str()) {
                unique.push(key);
            }
        }
        if unique.is_empty() {
            return Ok(IndexOutcome::Skipped(SkipReason::NoKeys));
        }
        if unique.len() >= self.max_keys {
            return Ok(IndexOutcome::Skipped(SkipReason::TooManyKeys {
                keys: unique.len(),
                max: self.max_keys,
            }));
        }

        let spec = IndexSpec::ascending(&unique);
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.provision(collection, &spec)).await {
            Ok(result) => result,
            Err(_) => Err(ReportError::Timeout {
                operation: "ensure index",
                elapsed: started.elapsed(),
            }),
        }
    }

    /// [`Self::ensure_index`] with failures logged and counted, never returned.
    pub async fn ensure_index_best_effort(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Option<IndexOutcome> {
        match self.ensure_index(collection, keys).await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.metrics.increment_index_failures();
                warn!(
                    event = %Event::IndexFailed,
                    collection,
                    code = err.code(),
                    error = %err,
                    "index maintenance failed"
                );
                None
            }
        }
    }

    async fn provision(&self, collection: &str, spec: &IndexSpec) -> ReportResult<IndexOutcome> {
        let usage = self
            .store
            .index_usage(collection)
            .await
            .map_err(ReportError::store("read index usage"))?;

        let existing = usage
            .iter()
            .find(|u| u.spec.same_keys(spec))
            .map(|u| u.name.clone());

        match existing {
            Some(name) => {
                let evicted = self.evict(collection, usage, self.budget, Some(&name)).await?;
                debug!(collection, index = %name, "index present");
                Ok(IndexOutcome::Existing { name, evicted })
            }
            None => {
                let keep = self.budget.saturating_sub(1);
                let evicted = self.evict(collection, usage, keep, None).await?;
                let name = self
                    .store
                    .create_index(collection, spec)
                    .await
                    .map_err(ReportError::store("create index"))?;
                self.metrics.increment_indexes_created();
                info!(event = %Event::IndexCreated, collection, index = %name);
                Ok(IndexOutcome::Created { name, evicted })
            }
        }
    }

    /// Drops the lowest-ranked indexes until at most `keep` remain.
    async fn evict(
        &self,
        collection: &str,
        usage: Vec<IndexUsage>,
        keep: usize,
        protected: Option<&str>,
    ) -> ReportResult<Vec<String>> {
        if usage.len() <= keep {
            return Ok(Vec::new());
        }

        let excess = usage.len() - keep;
        let victims: Vec<String> = rank(usage)
            .into_iter()
            .rev()
            .filter(|u| Some(u.name.as_str()) != protected)
            .take(excess)
            .map(|u| u.name)
            .collect();

        for name in &victims {
            self.store
                .drop_index(collection, name)
                .await
                .map_err(ReportError::store("drop index"))?;
            info!(event = %Event::IndexEvicted, collection, index = %name);
        }
        self.metrics.add_indexes_evicted(victims.len() as u64);
        Ok(victims)
    }
}

/// Best first: most accessed, then by name.
pub fn rank(mut usage: Vec<IndexUsage>) -> Vec<IndexUsage> {
    usage.sort_by(|a, b| b.accesses.cmp(&a.accesses).then_with(|| a.name.cmp(&b.name)));
    usage
}
