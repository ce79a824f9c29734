//! CLI Fixture Tests
//!
//! Tests for the file-driven surface:
//! - Configuration files are parsed, defaulted and validated
//! - Fixture files load into a tenant whose reports materialize and query

mod common;

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tempfile::NamedTempFile;

use common::*;
use report_engine::cli::{self, CliErrorCode, FixtureArgs};
use report_engine::query::ReportQuery;
use report_engine::{EngineConfig, ReportService, Tenant};

// =============================================================================
// Helper Functions
// =============================================================================

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Fixture with the `flat` report and three raw (unnormalized) records.
fn fixture_file() -> NamedTempFile {
    let definition = draft("flat", flat(), vec![], "and").into_definition("tester", Utc::now());
    let fixture = json!({
        "fields": [
            {"field_id": "region", "app_id": APP, "datastore_id": DATASTORE, "field_type": "text"},
            {"field_id": "amount", "app_id": APP, "datastore_id": DATASTORE, "field_type": "number"}
        ],
        "item_sales": [
            {"item_id": "b", "app_id": APP, "datastore_id": DATASTORE, "owners": ["g1"],
             "items": {"region": {"data_type": "text", "value": "north"},
                       "amount": {"data_type": "number", "value": "7"}}},
            {"item_id": "a", "app_id": APP, "datastore_id": DATASTORE, "owners": ["g1"],
             "items": {"region": {"data_type": "text", "value": "south"},
                       "amount": {"data_type": "number", "value": "3.5"}}},
            {"item_id": "c", "app_id": APP, "datastore_id": DATASTORE, "owners": ["g2"],
             "items": {"region": {"data_type": "text", "value": "east"},
                       "amount": {"data_type": "number", "value": 1}}}
        ],
        "reports": [definition]
    });
    temp_file(&fixture.to_string())
}

// =============================================================================
// Configuration
// =============================================================================

/// Missing keys take their defaults.
#[test]
fn test_partial_config_file() {
    let file = temp_file(r#"{"index_budget": 8, "strict_conditions": true, "log": {"format": "pretty"}}"#);

    let config = cli::load_config(Some(file.path())).unwrap();

    assert_eq!(config.index_budget, 8);
    assert!(config.strict_conditions);
    assert_eq!(config.max_index_keys, EngineConfig::default().max_index_keys);
    assert_eq!(config.download_batch_size, 100);
}

/// Invalid values and unparsable files are config errors.
#[test]
fn test_invalid_config_files() {
    for content in [r#"{"index_budget": 0}"#, r#"{"query_timeout_secs": 0}"#, "not json"] {
        let file = temp_file(content);
        let err = cli::load_config(Some(file.path())).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::ConfigError, "{}", content);
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Raw item documents are normalized when loaded.
#[tokio::test]
async fn test_fixture_items_are_normalized() {
    let file = fixture_file();

    let store = cli::load_fixture(file.path()).await.unwrap();

    let items = store.documents("item_sales").unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["items"]["amount"]["value"], json!(7.0));
}

/// A loaded fixture materializes and answers queries.
#[tokio::test]
async fn test_fixture_tenant_serves_reports() {
    let file = fixture_file();
    let store = cli::load_fixture(file.path()).await.unwrap();
    let service = ReportService::new(Tenant::in_store("fixture", Arc::new(store), EngineConfig::default()));

    service.materialize_now("flat").await.unwrap();
    let page = service
        .find_report_data(&ReportQuery::new("flat", vec!["g1".to_string()]))
        .await
        .unwrap();

    assert_eq!(item_ids(&page), vec!["a", "b"]);
    assert_eq!(item_value(&page.rows[0], "amount"), &json!(3.5));
}

/// CLI commands run end to end against a fixture file.
#[tokio::test]
async fn test_commands_against_fixture() {
    let file = fixture_file();
    let fixture = FixtureArgs {
        fixture: file.path().to_path_buf(),
    };

    cli::materialize(&fixture, EngineConfig::default(), "flat").await.unwrap();
    cli::count(&fixture, EngineConfig::default(), "flat", &everyone())
        .await
        .unwrap();
    cli::query(&fixture, EngineConfig::default(), ReportQuery::new("flat", everyone()).page(1, 2))
        .await
        .unwrap();
}

/// Unknown reports fail with an engine error.
#[tokio::test]
async fn test_unknown_report_fails() {
    let file = fixture_file();
    let fixture = FixtureArgs {
        fixture: file.path().to_path_buf(),
    };

    let err = cli::materialize(&fixture, EngineConfig::default(), "other")
        .await
        .unwrap_err();

    assert_eq!(err.code(), CliErrorCode::EngineError);
}
