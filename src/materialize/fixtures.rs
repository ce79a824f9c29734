//! Shared fixtures for materialization tests

use std::sync::Arc;

use chrono::Utc;

use crate::catalog::Field;
use crate::condition::FilterCondition;
use crate::config::EngineConfig;
use crate::plan::{AggregateKey, GroupSpec, KeyInfo, Reduction};
use crate::record::ItemRecord;
use crate::report::{ReportDraft, ReportId, ReportMode};
use crate::store::{DocumentStore, MemoryStore, FIELDS};
use crate::tenant::Tenant;
use crate::value::{DataType, Value};

/// `sales` datastore: s1 north 10, s2 south 5, s3 north 7, all owned by g1.
pub async fn sales_tenant() -> (Arc<MemoryStore>, Arc<Tenant>) {
    let store = Arc::new(MemoryStore::new());
    let fields = [
        Field::new("app", "sales", "region", DataType::Text),
        Field::new("app", "sales", "amount", DataType::Number),
    ];
    store
        .insert_many(
            FIELDS,
            fields.iter().map(|f| serde_json::to_value(f).unwrap()).collect(),
        )
        .await
        .unwrap();
    let records = [("s1", "north", 10.0), ("s2", "south", 5.0), ("s3", "north", 7.0)];
    store
        .insert_many(
            "item_sales",
            records
                .iter()
                .map(|(id, region, amount)| {
                    ItemRecord::new("app", "sales", *id)
                        .owner("g1")
                        .field("region", Value::Text(region.to_string()))
                        .field("amount", Value::Number(*amount))
                        .to_document()
                })
                .collect(),
        )
        .await
        .unwrap();
    let tenant = Tenant::in_store("t1", store.clone(), EngineConfig::default());
    (store, Arc::new(tenant))
}

pub async fn save_report(
    tenant: &Tenant,
    id: &str,
    mode: ReportMode,
    conditions: Vec<FilterCondition>,
) -> ReportId {
    let draft = ReportDraft {
        report_id: Some(ReportId::parse(id).unwrap()),
        domain: "example.com".into(),
        app_id: "app".into(),
        datastore_id: "sales".into(),
        report_name: id.into(),
        display_order: 0,
        report_conditions: conditions,
        condition_type: "and".into(),
        mode,
    };
    let definition = draft.into_definition("tester", Utc::now());
    tenant.reports.save(&definition).await.unwrap();
    definition.report_id
}

/// Sum of `amount` and count per region
pub fn by_region() -> ReportMode {
    ReportMode::Group {
        group_info: GroupSpec {
            group_keys: vec![KeyInfo::dynamic("region", DataType::Text)],
            aggre_keys: vec![AggregateKey::new(
                KeyInfo::dynamic("amount", DataType::Number),
                Reduction::Sum,
            )],
            show_count: true,
        },
    }
}
