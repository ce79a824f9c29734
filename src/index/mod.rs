//! Index lifecycle for materialized report collections
//!
//! Query key-sets (owners, filter paths, sort paths) are turned into
//! composite indexes on demand.
//!
//! # Invariants
//!
//! - A collection never holds more than the configured budget of indexes
//! - Eviction removes the least-accessed indexes first
//! - Index maintenance failures never fail the query that triggered them
//!   (see [`IndexManager::ensure_index_best_effort`])

mod manager;

pub use manager::{rank, IndexManager, IndexOutcome, SkipReason};
