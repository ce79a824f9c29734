//! Field catalog resolution
//!
//! Loads the active fields of a datastore and, following lookup fields,
//! of every datastore reachable from it. Each datastore is loaded at most
//! once per resolution, so lookup cycles terminate.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::types::{Datastore, Field};
use crate::condition::{Operand, Predicate};
use crate::error::{ReportError, ReportResult};
use crate::store::{DocumentStore, FindOptions, StoreError, DATA_STORES, FIELDS};

/// Source of field and datastore metadata
#[async_trait]
pub trait FieldCatalog: Send + Sync {
    /// All fields of a datastore, including soft-deleted ones.
    async fn fields(&self, app_id: &str, datastore_id: &str) -> ReportResult<Vec<Field>>;

    async fn datastore(&self, app_id: &str, datastore_id: &str)
        -> ReportResult<Option<Datastore>>;
}

/// [`FieldCatalog`] over the `fields` and `data_stores` collections
pub struct StoreCatalog {
    store: Arc<dyn DocumentStore>,
}

impl StoreCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

fn scoped(app_id: &str, datastore_id: &str) -> Predicate {
    Predicate::and(vec![
        Predicate::eq("app_id", Operand::Text(app_id.into())),
        Predicate::eq("datastore_id", Operand::Text(datastore_id.into())),
    ])
}

#[async_trait]
impl FieldCatalog for StoreCatalog {
    async fn fields(&self, app_id: &str, datastore_id: &str) -> ReportResult<Vec<Field>> {
        let docs = self
            .store
            .find(FIELDS, &scoped(app_id, datastore_id), &FindOptions::default())
            .await
            .map_err(ReportError::store("load fields"))?;

        docs.into_iter()
            .map(|doc| {
                serde_json::from_value(doc)
                    .map_err(|e| ReportError::store("load fields")(StoreError::decode(FIELDS, e)))
            })
            .collect()
    }

    async fn datastore(
        &self,
        app_id: &str,
        datastore_id: &str,
    ) -> ReportResult<Option<Datastore>> {
        let mut docs = self
            .store
            .find(DATA_STORES, &scoped(app_id, datastore_id), &FindOptions::default())
            .await
            .map_err(ReportError::store("load datastore"))?;

        match docs.pop() {
            Some(doc) => serde_json::from_value(doc).map(Some).map_err(|e| {
                ReportError::store("load datastore")(StoreError::decode(DATA_STORES, e))
            }),
            None => Ok(None),
        }
    }
}

/// Active fields of a datastore and of every datastore its lookups reach
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCatalog {
    root: String,
    fields: BTreeMap<String, Vec<Field>>,
}

impl ResolvedCatalog {
    /// Active fields of the root datastore, in display order
    pub fn root_fields(&self) -> &[Field] {
        self.fields_of(&self.root).unwrap_or(&[])
    }

    pub fn fields_of(&self, datastore_id: &str) -> Option<&[Field]> {
        self.fields.get(datastore_id).map(Vec::as_slice)
    }

    pub fn field(&self, datastore_id: &str, field_id: &str) -> Option<&Field> {
        self.fields_of(datastore_id)?
            .iter()
            .find(|f| f.field_id == field_id)
    }

    /// Function fields of the root datastore
    pub fn function_fields(&self) -> impl Iterator<Item = &Field> {
        self.root_fields().iter().filter(|f| f.is_function())
    }

    /// Every resolved datastore id
    pub fn datastores(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Resolves catalogs through a [`FieldCatalog`]
#[derive(Clone)]
pub struct CatalogResolver {
    catalog: Arc<dyn FieldCatalog>,
}

impl CatalogResolver {
    pub fn new(catalog: Arc<dyn FieldCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolves `datastore_id` and its lookup chain.
    ///
    /// Fields are ordered by display order ascending, then creation time
    /// descending. Soft-deleted fields are dropped.
    pub async fn resolve(&self, app_id: &str, datastore_id: &str) -> ReportResult<ResolvedCatalog> {
        let mut resolved = ResolvedCatalog {
            root: datastore_id.to_string(),
            fields: BTreeMap::new(),
        };
        let mut pending = VecDeque::from([(app_id.to_string(), datastore_id.to_string())]);

        while let Some((app, datastore)) = pending.pop_front() {
            if resolved.fields.contains_key(&datastore) {
                continue;
            }

            let mut fields = self.catalog.fields(&app, &datastore).await?;
            fields.retain(Field::is_active);
            fields.sort_by(|a, b| {
                a.display_order
                    .cmp(&b.display_order)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            });

            for (lookup_app, lookup_datastore) in fields.iter().filter_map(Field::lookup_target) {
                if !resolved.fields.contains_key(lookup_datastore) {
                    pending.push_back((lookup_app.to_string(), lookup_datastore.to_string()));
                }
            }

            debug!(datastore_id = %datastore, fields = fields.len(), "catalog resolved");
            resolved.fields.insert(datastore, fields);
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::value::DataType;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Catalog that counts loads per call
    struct CountingCatalog {
        inner: StoreCatalog,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl FieldCatalog for CountingCatalog {
        async fn fields(&self, app_id: &str, datastore_id: &str) -> ReportResult<Vec<Field>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.fields(app_id, datastore_id).await
        }

        async fn datastore(
            &self,
            app_id: &str,
            datastore_id: &str,
        ) -> ReportResult<Option<Datastore>> {
            self.inner.datastore(app_id, datastore_id).await
        }
    }

    fn field(ds: &str, id: &str, order: i64) -> Field {
        let mut f = Field::new("app", ds, id, DataType::Text);
        f.display_order = order;
        f
    }

    fn lookup(ds: &str, id: &str, target: &str) -> Field {
        let mut f = Field::new("app", ds, id, DataType::Lookup);
        f.lookup_datastore_id = target.into();
        f
    }

    async fn seed(fields: Vec<Field>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let docs = fields
            .into_iter()
            .map(|f| serde_json::to_value(f).unwrap())
            .collect();
        store.insert_many(FIELDS, docs).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_ordering_and_soft_delete() {
        let mut newer = field("orders", "b", 1);
        newer.created_at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut older = field("orders", "c", 1);
        older.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut deleted = field("orders", "d", 0);
        deleted.deleted_by = Some("admin".into());

        let store = seed(vec![older, field("orders", "a", 0), newer, deleted]).await;
        let resolver = CatalogResolver::new(Arc::new(StoreCatalog::new(store)));
        let resolved = resolver.resolve("app", "orders").await.unwrap();

        let ids: Vec<_> = resolved.root_fields().iter().map(|f| f.field_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_lookup_cycle_loads_each_datastore_once() {
        let store = seed(vec![
            lookup("orders", "customer", "customers"),
            lookup("customers", "last_order", "orders"),
            lookup("customers", "region", "regions"),
            field("regions", "name", 0),
        ])
        .await;
        let catalog = Arc::new(CountingCatalog {
            inner: StoreCatalog::new(store),
            loads: AtomicUsize::new(0),
        });
        let resolver = CatalogResolver::new(catalog.clone());

        let resolved = resolver.resolve("app", "orders").await.unwrap();

        assert_eq!(catalog.loads.load(Ordering::SeqCst), 3);
        let datastores: Vec<_> = resolved.datastores().collect();
        assert_eq!(datastores, vec!["customers", "orders", "regions"]);
        assert!(resolved.field("regions", "name").is_some());
    }

    #[tokio::test]
    async fn test_function_fields_pass_through() {
        let mut total = Field::new("app", "orders", "total", DataType::Function);
        total.return_type = Some(DataType::Number);
        total.formula = Some(r#"{"$multiply": ["$items.qty.value", 2]}"#.into());
        let store = seed(vec![total.clone(), field("orders", "qty", 0)]).await;

        let resolver = CatalogResolver::new(Arc::new(StoreCatalog::new(store)));
        let resolved = resolver.resolve("app", "orders").await.unwrap();

        let functions: Vec<_> = resolved.function_fields().collect();
        assert_eq!(functions, vec![&total]);
    }

    #[tokio::test]
    async fn test_datastore_relations_load() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_many(
                DATA_STORES,
                vec![serde_json::json!({
                    "datastore_id": "orders",
                    "app_id": "app",
                    "relations": [{
                        "relation_id": "r1",
                        "datastore_id": "customers",
                        "fields": {"code": "customer_code"}
                    }]
                })],
            )
            .await
            .unwrap();
        let catalog = StoreCatalog::new(store);
        let ds = catalog.datastore("app", "orders").await.unwrap().unwrap();
        assert_eq!(ds.relations.len(), 1);
        assert_eq!(ds.relations[0].fields["code"], "customer_code");
        assert!(catalog.datastore("app", "missing").await.unwrap().is_none());
    }
}
