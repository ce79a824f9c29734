//! Shared fixtures for integration tests
//!
//! The `sales` datastore holds five records:
//!
//! | item | region | amount | closed     | owner |
//! |------|--------|--------|------------|-------|
//! | s1   | north  | 10     | today      | g1    |
//! | s2   | south  | 5      | 3 days ago | g1    |
//! | s3   | north  | 15     | in 3 days  | g2    |
//! | s4   | east   | 20     | 10 days ago| g1    |
//! | s5   | south  | 12     | in 10 days | g2    |
//!
//! Dates are relative to [`fixed_now`], which is also the clock of every
//! service built here. Records are inserted out of id order.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value as Json;

use report_engine::catalog::Field;
use report_engine::condition::FilterCondition;
use report_engine::plan::{AggregateKey, GroupSpec, KeyInfo, Reduction};
use report_engine::query::{ReportPage, ReportQuery};
use report_engine::record::ItemRecord;
use report_engine::report::{ReportDraft, ReportId, ReportMode};
use report_engine::store::{DocumentStore, MemoryStore, FIELDS};
use report_engine::value::{DataType, Value};
use report_engine::{EngineConfig, ReportService, Tenant};

pub const APP: &str = "app";
pub const DATASTORE: &str = "sales";

// =============================================================================
// Store and service
// =============================================================================

/// Midday, so "today" stays today for any run length
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

pub async fn sales_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let fields = [
        Field::new(APP, DATASTORE, "region", DataType::Text),
        Field::new(APP, DATASTORE, "amount", DataType::Number),
        Field::new(APP, DATASTORE, "closed", DataType::Date),
    ];
    store
        .insert_many(
            FIELDS,
            fields.iter().map(|f| serde_json::to_value(f).unwrap()).collect(),
        )
        .await
        .unwrap();

    let now = fixed_now();
    let records = [
        ("s3", "north", 15.0, now + Duration::days(3), "g2"),
        ("s1", "north", 10.0, now, "g1"),
        ("s5", "south", 12.0, now + Duration::days(10), "g2"),
        ("s2", "south", 5.0, now - Duration::days(3), "g1"),
        ("s4", "east", 20.0, now - Duration::days(10), "g1"),
    ];
    store
        .insert_many(
            "item_sales",
            records
                .iter()
                .map(|(id, region, amount, closed, owner)| {
                    ItemRecord::new(APP, DATASTORE, *id)
                        .owner(*owner)
                        .field("region", Value::Text(region.to_string()))
                        .field("amount", Value::Number(*amount))
                        .field("closed", Value::Date(*closed))
                        .to_document()
                })
                .collect(),
        )
        .await
        .unwrap();
    store
}

pub fn service(store: Arc<MemoryStore>, config: EngineConfig) -> ReportService {
    ReportService::new(Tenant::in_store("t1", store, config).with_clock(Arc::new(fixed_now)))
}

pub async fn sales_service() -> (Arc<MemoryStore>, ReportService) {
    let store = sales_store().await;
    let service = service(store.clone(), EngineConfig::default());
    (store, service)
}

// =============================================================================
// Report definitions
// =============================================================================

pub fn draft(id: &str, mode: ReportMode, conditions: Vec<FilterCondition>, combinator: &str) -> ReportDraft {
    ReportDraft {
        report_id: Some(ReportId::parse(id).unwrap()),
        domain: "example.com".into(),
        app_id: APP.into(),
        datastore_id: DATASTORE.into(),
        report_name: id.into(),
        display_order: 0,
        report_conditions: conditions,
        condition_type: combinator.into(),
        mode,
    }
}

/// Flat report of region and amount
pub fn flat() -> ReportMode {
    ReportMode::Select {
        select_key_infos: vec![
            KeyInfo::dynamic("region", DataType::Text),
            KeyInfo::dynamic("amount", DataType::Number),
        ],
    }
}

/// Per region: `reduction` of amount, plus count
pub fn by_region(reduction: Reduction) -> ReportMode {
    ReportMode::Group {
        group_info: GroupSpec {
            group_keys: vec![KeyInfo::dynamic("region", DataType::Text)],
            aggre_keys: vec![AggregateKey::new(
                KeyInfo::dynamic("amount", DataType::Number),
                reduction,
            )],
            show_count: true,
        },
    }
}

/// Creates a report and waits until it is materialized.
pub async fn materialized(service: &ReportService, draft: ReportDraft) -> String {
    let definition = service.create_report(draft, "tester").await.unwrap();
    let id = definition.report_id.as_str().to_string();
    service.materialize_now(&id).await.unwrap();
    id
}

// =============================================================================
// Queries
// =============================================================================

pub fn everyone() -> Vec<String> {
    vec!["g1".to_string(), "g2".to_string()]
}

pub async fn all_rows(service: &ReportService, report_id: &str) -> ReportPage {
    service
        .find_report_data(&ReportQuery::new(report_id, everyone()))
        .await
        .unwrap()
}

pub fn item_ids(page: &ReportPage) -> Vec<String> {
    page.rows
        .iter()
        .map(|row| row["item_id"].as_str().unwrap_or_default().to_string())
        .collect()
}

pub fn item_value<'a>(row: &'a Json, field_id: &str) -> &'a Json {
    &row["items"][field_id]["value"]
}
