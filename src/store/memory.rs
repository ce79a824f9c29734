//! In-process document store
//!
//! Collections are vectors of JSON documents kept in insertion order.
//! Secondary indexes are catalog entries: they do not change results, but
//! every read picks the best matching index and bumps its access counter,
//! which is what index eviction ranks on.
//!
//! # Index selection
//!
//! 1. Index whose leading key is an equality path of the filter
//! 2. Index whose leading key is any filter path
//! 3. Index whose leading key is the first sort path
//!
//! Within a class the longest covered key prefix wins; ties are broken
//! lexicographically by index name.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::errors::{StoreError, StoreResult};
use super::index::{IndexSpec, IndexUsage};
use super::sort::sort_documents;
use super::{DocumentStore, FindOptions};
use crate::condition::Predicate;
use crate::document::{get_path, set_path, Document};

/// Index slots per collection, matching common document databases
pub const DEFAULT_INDEX_LIMIT: usize = 64;

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Document>,
    indexes: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    spec: IndexSpec,
    accesses: u64,
}

/// In-memory [`DocumentStore`]
#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    unavailable: RwLock<HashSet<String>>,
    index_limit: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            unavailable: RwLock::new(HashSet::new()),
            index_limit: DEFAULT_INDEX_LIMIT,
        }
    }

    pub fn with_index_limit(mut self, limit: usize) -> Self {
        self.index_limit = limit;
        self
    }

    /// Makes every operation on `collection` fail with `Unavailable`.
    pub fn set_unavailable(&self, collection: &str, unavailable: bool) -> StoreResult<()> {
        let mut set = self.unavailable.write().map_err(|_| StoreError::LockPoisoned)?;
        if unavailable {
            set.insert(collection.to_string());
        } else {
            set.remove(collection);
        }
        Ok(())
    }

    /// Snapshot of a collection's documents, in store order.
    pub fn documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default())
    }

    pub fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        let collections = self.collections.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections.contains_key(collection))
    }

    fn check_available(&self, collection: &str) -> StoreResult<()> {
        let set = self.unavailable.read().map_err(|_| StoreError::LockPoisoned)?;
        if set.contains(collection) {
            return Err(StoreError::Unavailable(collection.to_string()));
        }
        Ok(())
    }

    /// Records an index access for a read, if any index serves it.
    fn touch_index(collection: &mut Collection, filter: &Predicate, sort_paths: &[&str]) {
        if let Some(name) = select_index(&collection.indexes, filter, sort_paths) {
            if let Some(entry) = collection.indexes.get_mut(&name) {
                entry.accesses += 1;
            }
        }
    }
}

fn select_index(
    indexes: &BTreeMap<String, IndexEntry>,
    filter: &Predicate,
    sort_paths: &[&str],
) -> Option<String> {
    let equality = filter.equality_paths();
    let filtered = filter.paths();
    let covered = |path: &str| filtered.iter().any(|p| p == path) || sort_paths.contains(&path);

    indexes
        .iter()
        .filter_map(|(name, entry)| {
            let leading = entry.spec.keys.first()?.path.as_str();
            let class = if equality.iter().any(|p| p == leading) {
                0
            } else if filtered.iter().any(|p| p == leading) {
                1
            } else if sort_paths.first() == Some(&leading) {
                2
            } else {
                return None;
            };
            let prefix = entry.spec.paths().take_while(|p| covered(*p)).count();
            Some((class, Reverse(prefix), name))
        })
        .min()
        .map(|(_, _, name)| name.clone())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Predicate,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(Vec::new());
        };

        let sort_paths: Vec<&str> = options.sort.iter().map(|k| k.path.as_str()).collect();
        Self::touch_index(coll, filter, &sort_paths);

        let mut matched: Vec<Document> = coll
            .documents
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        sort_documents(&mut matched, &options.sort);

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> StoreResult<u64> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        Self::touch_index(coll, filter, &[]);
        Ok(coll.documents.iter().filter(|doc| filter.matches(doc)).count() as u64)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<()> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        collections
            .entry(collection.to_string())
            .or_default()
            .documents
            .extend(documents);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        key_path: &str,
        document: Document,
    ) -> StoreResult<()> {
        self.check_available(collection)?;
        let key = get_path(&document, key_path)
            .cloned()
            .ok_or_else(|| StoreError::decode(collection, format!("missing key {}", key_path)))?;

        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        let coll = collections.entry(collection.to_string()).or_default();
        let position = coll
            .documents
            .iter()
            .position(|doc| get_path(doc, key_path) == Some(&key));
        match position {
            Some(i) => coll.documents[i] = document,
            None => coll.documents.push(document),
        }
        Ok(())
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Predicate,
        fields: &[(&str, Document)],
    ) -> StoreResult<u64> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut updated = 0;
        for doc in coll.documents.iter_mut().filter(|doc| filter.matches(doc)) {
            for (path, value) in fields {
                set_path(doc, path, value.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_many(&self, collection: &str, filter: &Predicate) -> StoreResult<u64> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = coll.documents.len();
        coll.documents.retain(|doc| !filter.matches(doc));
        Ok((before - coll.documents.len()) as u64)
    }

    async fn replace_collection(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<()> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        collections.entry(collection.to_string()).or_default().documents = documents;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<bool> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections.remove(collection).is_some())
    }

    async fn index_usage(&self, collection: &str) -> StoreResult<Vec<IndexUsage>> {
        self.check_available(collection)?;
        let collections = self.collections.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections
            .get(collection)
            .map(|coll| {
                coll.indexes
                    .iter()
                    .map(|(name, entry)| IndexUsage {
                        name: name.clone(),
                        spec: entry.spec.clone(),
                        accesses: entry.accesses,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> StoreResult<String> {
        self.check_available(collection)?;
        if spec.keys.is_empty() {
            return Err(StoreError::InvalidIndex("no keys".into()));
        }

        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        let coll = collections.entry(collection.to_string()).or_default();

        if let Some((name, _)) = coll.indexes.iter().find(|(_, e)| e.spec.same_keys(spec)) {
            return Ok(name.clone());
        }
        if coll.indexes.len() >= self.index_limit {
            return Err(StoreError::IndexLimit {
                collection: collection.to_string(),
                limit: self.index_limit,
            });
        }

        // generated names can collide across key-sets (`a_1_b` vs `[a, b]`)
        let base = spec.name();
        let mut name = base.clone();
        let mut suffix = 2;
        while coll.indexes.contains_key(&name) {
            name = format!("{}~{}", base, suffix);
            suffix += 1;
        }
        coll.indexes.insert(
            name.clone(),
            IndexEntry {
                spec: spec.clone(),
                accesses: 0,
            },
        );
        Ok(name)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()> {
        self.check_available(collection)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::LockPoisoned)?;
        let removed = collections
            .get_mut(collection)
            .and_then(|coll| coll.indexes.remove(name));
        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::IndexNotFound {
                collection: collection.to_string(),
                name: name.to_string(),
            }),
        }
    }
}
