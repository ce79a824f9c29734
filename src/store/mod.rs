//! Document store seam
//!
//! The engine runs against a document database through [`DocumentStore`].
//! The store owns the facilities the engine relies on:
//!
//! - predicate scans with sort, skip and limit
//! - counting with the same predicate
//! - atomic replacement of a whole collection
//! - an index catalog with per-index access counters
//!
//! [`MemoryStore`] is the in-process implementation.

mod errors;
mod index;
mod memory;
mod sort;

pub use errors::{StoreError, StoreResult};
pub use index::{IndexKey, IndexSpec, IndexUsage};
pub use memory::{MemoryStore, DEFAULT_INDEX_LIMIT};
pub use sort::{compare_documents, compare_values, sort_documents, SortDirection, SortKey};

use async_trait::async_trait;

use crate::condition::Predicate;
use crate::document::Document;

/// Report definitions
pub const REPORTS: &str = "reports";
/// Field metadata
pub const FIELDS: &str = "fields";
/// Datastore metadata (relations)
pub const DATA_STORES: &str = "data_stores";
/// Enumeration values and labels
pub const OPTIONS: &str = "options";
/// Identity directory
pub const USERS: &str = "users";
/// Tenant application settings
pub const APPS: &str = "apps";

/// Source records of a datastore
pub fn source_collection(datastore_id: &str) -> String {
    format!("item_{}", datastore_id)
}

/// Materialized output of a report
pub fn report_collection(report_id: &str) -> String {
    format!("report_{}", report_id)
}

/// Read options for [`DocumentStore::find`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub skip: u64,
    /// `None` returns every remaining document
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn sorted(sort: Vec<SortKey>) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    pub fn page(mut self, skip: u64, limit: Option<u64>) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }
}

/// Document database operations used by the engine
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents matching `filter`, sorted, then skipped and limited.
    async fn find(
        &self,
        collection: &str,
        filter: &Predicate,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Number of documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Predicate) -> StoreResult<u64>;

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<()>;

    /// Replaces the document whose `key_path` equals the new document's, or inserts it.
    async fn upsert(&self, collection: &str, key_path: &str, document: Document)
        -> StoreResult<()>;

    /// Sets each `(path, value)` pair on every matching document, returning
    /// how many changed. Paths not named are left as they are.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Predicate,
        fields: &[(&str, Document)],
    ) -> StoreResult<u64>;

    /// Deletes matching documents, returning how many were removed.
    async fn delete_many(&self, collection: &str, filter: &Predicate) -> StoreResult<u64>;

    /// Atomically swaps the collection's contents; existing indexes are kept.
    async fn replace_collection(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<()>;

    /// Drops the collection and its indexes. Returns whether it existed.
    async fn drop_collection(&self, collection: &str) -> StoreResult<bool>;

    /// Secondary indexes with their access counters.
    async fn index_usage(&self, collection: &str) -> StoreResult<Vec<IndexUsage>>;

    /// Creates an index, returning its name. Idempotent for identical keys.
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> StoreResult<String>;

    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert_eq!(source_collection("ds1"), "item_ds1");
        assert_eq!(report_collection("r1"), "report_r1");
    }

    #[test]
    fn test_find_options_page() {
        let options = FindOptions::sorted(vec![SortKey::ascending("item_id")]).page(20, Some(10));
        assert_eq!(options.skip, 20);
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.sort.len(), 1);
    }
}
