//! Index Budget Tests
//!
//! Tests for index provisioning on materialized collections:
//! - Queries provision an index for their key-set
//! - Past the budget, the least used indexes are evicted first
//! - The index serving the current query is never evicted

mod common;

use std::sync::Arc;

use common::*;
use report_engine::condition::{FilterCondition, Operand, Predicate};
use report_engine::query::ReportQuery;
use report_engine::store::{DocumentStore, FindOptions, IndexSpec, MemoryStore};
use report_engine::value::DataType;
use report_engine::{EngineConfig, ReportService};

// =============================================================================
// Helper Functions
// =============================================================================

const COLLECTION: &str = "report_flat";

async fn budgeted(budget: usize) -> (Arc<MemoryStore>, ReportService, String) {
    let store = sales_store().await;
    let config = EngineConfig {
        index_budget: budget,
        ..EngineConfig::default()
    };
    let service = service(store.clone(), config);
    let id = materialized(&service, draft("flat", flat(), vec![], "and")).await;
    (store, service, id)
}

/// Creates a single-path index on `items.<field>.value` and reads through it `uses` times.
async fn used_index(store: &MemoryStore, field: &str, uses: usize) {
    let path = format!("items.{}.value", field);
    store
        .create_index(COLLECTION, &IndexSpec::ascending(&[path.as_str()]))
        .await
        .unwrap();
    let filter = Predicate::eq(path, Operand::Text("x".into()));
    for _ in 0..uses {
        store.find(COLLECTION, &filter, &FindOptions::default()).await.unwrap();
    }
}

async fn index_names(store: &MemoryStore) -> Vec<String> {
    let mut names: Vec<String> = store
        .index_usage(COLLECTION)
        .await
        .unwrap()
        .into_iter()
        .map(|usage| usage.name)
        .collect();
    names.sort();
    names
}

fn region_query(id: &str) -> ReportQuery {
    ReportQuery::new(id, everyone()).filtered(
        vec![FilterCondition::dynamic("region", DataType::Text, "=", "north")],
        "and",
    )
}

const QUERY_INDEX: &str = "owners_1_items.region.value_1_item_id_1";

// =============================================================================
// Provisioning
// =============================================================================

/// A query creates the index for its owners, condition and sort paths.
#[tokio::test]
async fn test_query_provisions_index() {
    let (store, service, id) = budgeted(3).await;

    service.find_report_data(&region_query(&id)).await.unwrap();

    assert_eq!(index_names(&store).await, vec![QUERY_INDEX.to_string()]);
    assert_eq!(service.metrics().indexes_created, 1);
}

/// Repeating the query reuses its index.
#[tokio::test]
async fn test_repeated_query_reuses_index() {
    let (store, service, id) = budgeted(3).await;

    service.find_report_data(&region_query(&id)).await.unwrap();
    service.find_report_data(&region_query(&id)).await.unwrap();

    assert_eq!(index_names(&store).await.len(), 1);
    assert_eq!(service.metrics().indexes_created, 1);
}

// =============================================================================
// Eviction
// =============================================================================

/// At the budget, the least used index makes room for the new one.
#[tokio::test]
async fn test_full_budget_evicts_least_used() {
    let (store, service, id) = budgeted(3).await;
    used_index(&store, "a", 3).await;
    used_index(&store, "b", 1).await;
    used_index(&store, "c", 2).await;

    service.find_report_data(&region_query(&id)).await.unwrap();

    assert_eq!(
        index_names(&store).await,
        vec![
            "items.a.value_1".to_string(),
            "items.c.value_1".to_string(),
            QUERY_INDEX.to_string()
        ]
    );
    assert_eq!(service.metrics().indexes_evicted, 1);
}

/// Over the budget, eviction brings the count back to exactly the budget.
#[tokio::test]
async fn test_over_budget_evicts_lowest_usage() {
    let (store, service, id) = budgeted(3).await;
    for (field, uses) in [("a", 5), ("b", 1), ("c", 4), ("d", 2), ("e", 3)] {
        used_index(&store, field, uses).await;
    }

    service.find_report_data(&region_query(&id)).await.unwrap();

    let names = index_names(&store).await;
    assert_eq!(names.len(), 3);
    assert_eq!(
        names,
        vec![
            "items.a.value_1".to_string(),
            "items.c.value_1".to_string(),
            QUERY_INDEX.to_string()
        ]
    );
    assert_eq!(service.metrics().indexes_evicted, 3);
}

/// Eviction never drops the index that serves the running query.
#[tokio::test]
async fn test_serving_index_is_kept() {
    let (store, service, id) = budgeted(2).await;
    service.find_report_data(&region_query(&id)).await.unwrap();
    used_index(&store, "a", 10).await;
    used_index(&store, "b", 10).await;

    let page = service.find_report_data(&region_query(&id)).await.unwrap();

    assert_eq!(item_ids(&page), vec!["s1", "s3"]);
    let names = index_names(&store).await;
    assert_eq!(names.len(), 2);
    assert!(names.contains(&QUERY_INDEX.to_string()));
}

/// The default budget holds 52 indexes; the next key-set displaces the least used.
#[tokio::test]
async fn test_default_budget() {
    let budget = EngineConfig::default().index_budget;
    assert_eq!(budget, 52);
    let (store, service, id) = budgeted(budget).await;
    for i in 0..budget {
        used_index(&store, &format!("f{:02}", i), i + 1).await;
    }
    assert_eq!(index_names(&store).await.len(), budget);

    service.find_report_data(&region_query(&id)).await.unwrap();

    let names = index_names(&store).await;
    assert_eq!(names.len(), budget);
    assert!(names.contains(&QUERY_INDEX.to_string()));
    assert!(!names.contains(&"items.f00.value_1".to_string()));
    assert!(names.contains(&"items.f01.value_1".to_string()));
    assert_eq!(service.metrics().indexes_evicted, 1);
    assert_eq!(service.metrics().indexes_created, 1);
}
