//! Materialization Lifecycle Tests
//!
//! Tests for the background materialization contract:
//! - The last submitted run wins; older runs are superseded
//! - A failed run leaves the previously published rows in place
//! - Strict compilation rejects conditions lenient compilation skips
//! - Definition writes (create, modify, delete) drive the output
//! - Deletes and edits hold up against runs already in flight

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use common::*;
use report_engine::condition::FilterCondition;
use report_engine::plan::Reduction;
use report_engine::report::{
    MaterializationState, MaterializationStatus, ReportDefinition, ReportId, ReportPatch,
    ReportRepository, StoreReportRepository,
};
use report_engine::store::MemoryStore;
use report_engine::value::DataType;
use report_engine::{EngineConfig, ReportResult, ReportService, Tenant};

fn north_only() -> Vec<FilterCondition> {
    vec![FilterCondition::dynamic("region", DataType::Text, "=", "north")]
}

// =============================================================================
// Repository Wrappers
// =============================================================================

/// Delegating repository with hooks around reads and edits
struct Hooked {
    inner: StoreReportRepository,
    /// Delay after every `find`
    find_delay: Duration,
    /// Recorded just before an edit is written
    status_before_update: Option<MaterializationStatus>,
}

impl Hooked {
    fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            inner: StoreReportRepository::new(store),
            find_delay: Duration::ZERO,
            status_before_update: None,
        }
    }
}

#[async_trait]
impl ReportRepository for Hooked {
    async fn find(&self, report_id: &ReportId) -> ReportResult<Option<ReportDefinition>> {
        let found = self.inner.find(report_id).await;
        if !self.find_delay.is_zero() {
            tokio::time::sleep(self.find_delay).await;
        }
        found
    }

    async fn list(&self, app_id: &str, datastore_id: Option<&str>) -> ReportResult<Vec<ReportDefinition>> {
        self.inner.list(app_id, datastore_id).await
    }

    async fn save(&self, definition: &ReportDefinition) -> ReportResult<()> {
        self.inner.save(definition).await
    }

    async fn update(&self, definition: &ReportDefinition) -> ReportResult<()> {
        if let Some(status) = &self.status_before_update {
            self.inner.record_status(&definition.report_id, status).await?;
        }
        self.inner.update(definition).await
    }

    async fn remove(&self, report_id: &ReportId) -> ReportResult<bool> {
        self.inner.remove(report_id).await
    }

    async fn record_status(&self, report_id: &ReportId, status: &MaterializationStatus) -> ReportResult<()> {
        self.inner.record_status(report_id, status).await
    }
}

async fn hooked_service(hooks: impl FnOnce(&mut Hooked)) -> (Arc<MemoryStore>, ReportService) {
    let store = sales_store().await;
    let mut repository = Hooked::new(store.clone());
    hooks(&mut repository);
    let tenant = Tenant::in_store("t1", store.clone(), EngineConfig::default())
        .with_clock(Arc::new(fixed_now))
        .with_reports(Arc::new(repository));
    (store, ReportService::new(tenant))
}

// =============================================================================
// Last Submitted Wins
// =============================================================================

/// Runs queued behind a newer submission never publish.
#[tokio::test]
async fn test_last_submitted_run_wins() {
    let (_, service) = sales_service().await;
    let definition = service
        .create_report(draft("flat", flat(), vec![], "and"), "tester")
        .await
        .unwrap();
    let id = definition.report_id.as_str();

    let second = service.generate_report_data(id).await.unwrap();
    let third = service.generate_report_data(id).await.unwrap();
    let status = service.materialize_now(id).await.unwrap();

    assert!(second < third && third < status.generation);
    assert_eq!(status.state, MaterializationState::Published);
    let metrics = service.metrics();
    assert_eq!(
        metrics.materializations_superseded + metrics.materializations_published,
        status.generation
    );
    assert!(metrics.materializations_superseded >= 1);
}

/// The run after a modification publishes the modified definition.
#[tokio::test]
async fn test_latest_definition_is_published() {
    let (_, service) = sales_service().await;
    let id = materialized(&service, draft("flat", flat(), vec![], "and")).await;

    let patch = ReportPatch {
        report_conditions: Some(north_only()),
        ..Default::default()
    };
    let modified = service.modify_report(&id, patch, "editor").await.unwrap();
    assert_eq!(modified.materialization.state, MaterializationState::Scheduled);
    assert_eq!(modified.updated_by, "editor");

    service.materialize_now(&id).await.unwrap();
    let page = all_rows(&service, &id).await;

    assert_eq!(item_ids(&page), vec!["s1", "s3"]);
}

/// A concurrent modification and rerun both settle on the newest definition.
#[tokio::test]
async fn test_concurrent_runs_settle_on_latest() {
    let (_, service) = sales_service().await;
    let id = materialized(&service, draft("flat", flat(), vec![], "and")).await;

    let patch = ReportPatch {
        report_conditions: Some(north_only()),
        ..Default::default()
    };
    let (earlier, modified) = tokio::join!(
        service.materialize_now(&id),
        service.modify_report(&id, patch, "editor")
    );
    earlier.unwrap();
    modified.unwrap();
    let latest = service.materialize_now(&id).await.unwrap();

    assert_eq!(latest.state, MaterializationState::Published);
    assert_eq!(latest.rows, 2);
    assert_eq!(service.materialization_status(&id).await.unwrap(), latest);
}

// =============================================================================
// Failure Handling
// =============================================================================

/// A store outage fails the run, keeps prior rows and notifies subscribers.
#[tokio::test]
async fn test_failed_run_keeps_previous_output() {
    let (store, service) = sales_service().await;
    let id = materialized(&service, draft("flat", flat(), vec![], "and")).await;
    let mut failures = service.subscribe_failures();

    store.set_unavailable("item_sales", true).unwrap();
    let status = service.materialize_now(&id).await.unwrap();

    assert_eq!(status.state, MaterializationState::Failed);
    assert!(status.last_error.is_some());
    assert_eq!(status.rows, 5);
    assert_eq!(item_ids(&all_rows(&service, &id).await).len(), 5);

    let failure = tokio::time::timeout(Duration::from_secs(1), failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.report_id.as_str(), id);
    assert_eq!(failure.generation, status.generation);
    assert_eq!(failure.error.code(), "REPORT_STORE_ERROR");

    let persisted = service.get_report(&id).await.unwrap().materialization;
    assert_eq!(persisted.state, MaterializationState::Failed);
    assert_eq!(service.metrics().materializations_failed, 1);
}

/// The next run after an outage publishes again.
#[tokio::test]
async fn test_recovers_after_outage() {
    let (store, service) = sales_service().await;
    let id = materialized(&service, draft("flat", flat(), vec![], "and")).await;

    store.set_unavailable("item_sales", true).unwrap();
    service.materialize_now(&id).await.unwrap();
    store.set_unavailable("item_sales", false).unwrap();
    let status = service.materialize_now(&id).await.unwrap();

    assert_eq!(status.state, MaterializationState::Published);
    assert!(status.last_error.is_none());
}

// =============================================================================
// Strictness
// =============================================================================

fn unknown_type_condition() -> FilterCondition {
    FilterCondition::dynamic("region", DataType::Unknown, "=", "north")
}

/// Lenient compilation drops the condition and counts it.
#[tokio::test]
async fn test_lenient_skips_unknown_field_type() {
    let (_, service) = sales_service().await;
    let id = materialized(&service, draft("lenient", flat(), vec![unknown_type_condition()], "and")).await;

    let status = service.materialization_status(&id).await.unwrap();

    assert_eq!(status.state, MaterializationState::Published);
    assert_eq!(status.rows, 5);
    assert!(service.metrics().conditions_skipped >= 1);
}

/// Strict compilation fails the run.
#[tokio::test]
async fn test_strict_rejects_unknown_field_type() {
    let store = sales_store().await;
    let config = EngineConfig {
        strict_conditions: true,
        ..EngineConfig::default()
    };
    let service = service(store.clone(), config);
    let definition = service
        .create_report(draft("strict", flat(), vec![unknown_type_condition()], "and"), "tester")
        .await
        .unwrap();

    let status = service
        .materialize_now(definition.report_id.as_str())
        .await
        .unwrap();

    assert_eq!(status.state, MaterializationState::Failed);
    assert!(!store.collection_exists("report_strict").unwrap());
}

// =============================================================================
// Definition Writes
// =============================================================================

/// Creating an existing report id is rejected.
#[tokio::test]
async fn test_duplicate_create_rejected() {
    let (_, service) = sales_service().await;
    materialized(&service, draft("flat", flat(), vec![], "and")).await;

    let err = service
        .create_report(draft("flat", flat(), vec![], "and"), "tester")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "REPORT_VALIDATION");
}

/// Soft delete hides the definition but keeps its rows.
#[tokio::test]
async fn test_soft_delete_keeps_rows() {
    let (store, service) = sales_service().await;
    let id = materialized(&service, draft("flat", flat(), vec![], "and")).await;

    service.delete_report(&id, "admin").await.unwrap();

    let err = service.get_report(&id).await.unwrap_err();
    assert_eq!(err.code(), "REPORT_NOT_FOUND");
    assert!(service.list_reports(APP, None).await.unwrap().is_empty());
    assert_eq!(store.documents("report_flat").unwrap().len(), 5);
}

/// Soft delete takes effect whoever the writer is.
#[tokio::test]
async fn test_soft_delete_without_writer() {
    let (store, service) = sales_service().await;
    let id = materialized(&service, draft("flat", flat(), vec![], "and")).await;

    service.delete_report(&id, "").await.unwrap();

    let err = service.get_report(&id).await.unwrap_err();
    assert_eq!(err.code(), "REPORT_NOT_FOUND");
    assert!(service.list_reports(APP, None).await.unwrap().is_empty());
    let err = service.materialize_now(&id).await.unwrap_err();
    assert_eq!(err.code(), "REPORT_NOT_FOUND");
    assert_eq!(store.documents("report_flat").unwrap().len(), 5);
}

/// A status recorded while an edit is in progress survives the edit.
#[tokio::test]
async fn test_modify_keeps_concurrently_recorded_status() {
    let raced = MaterializationStatus::published(77, 5, Utc::now());
    let (store, service) = hooked_service(|repo| repo.status_before_update = Some(raced.clone())).await;
    let definition = service
        .create_report(draft("flat", flat(), vec![], "and"), "tester")
        .await
        .unwrap();

    let patch = ReportPatch {
        report_name: Some("renamed".into()),
        ..Default::default()
    };
    service
        .modify_report(definition.report_id.as_str(), patch, "editor")
        .await
        .unwrap();

    let stored = store.documents("reports").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["report_name"], "renamed");
    assert_eq!(stored[0]["updated_by"], "editor");
    assert_eq!(stored[0]["materialization"]["generation"], 77);
}

/// Hard delete drops the definition and its rows.
#[tokio::test]
async fn test_hard_delete_drops_rows() {
    let (store, service) = sales_service().await;
    let id = materialized(&service, draft("sums", by_region(Reduction::Sum), vec![], "and")).await;

    assert!(service.hard_delete_report(&id).await.unwrap());
    assert!(!service.hard_delete_report(&id).await.unwrap());

    assert!(!store.collection_exists("report_sums").unwrap());
    let err = service.materialize_now(&id).await.unwrap_err();
    assert_eq!(err.code(), "REPORT_NOT_FOUND");
}

/// A run already computing when the report is hard deleted never republishes.
#[tokio::test]
async fn test_hard_delete_supersedes_running_materialization() {
    let (store, service) = hooked_service(|repo| repo.find_delay = Duration::from_millis(200)).await;
    let definition = service
        .create_report(draft("flat", flat(), vec![], "and"), "tester")
        .await
        .unwrap();
    let id = definition.report_id.as_str().to_string();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(service.hard_delete_report(&id).await.unwrap());
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(!store.collection_exists("report_flat").unwrap());
    assert!(store.documents("reports").unwrap().is_empty());
    assert_eq!(service.metrics().materializations_published, 0);
}

/// Listing is per app and datastore.
#[tokio::test]
async fn test_list_reports_by_datastore() {
    let (_, service) = sales_service().await;
    materialized(&service, draft("flat", flat(), vec![], "and")).await;
    materialized(&service, draft("sums", by_region(Reduction::Sum), vec![], "and")).await;

    let all = service.list_reports(APP, Some(DATASTORE)).await.unwrap();
    let other = service.list_reports(APP, Some("elsewhere")).await.unwrap();

    assert_eq!(all.len(), 2);
    assert!(other.is_empty());
}
