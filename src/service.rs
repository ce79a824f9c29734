//! Report service
//!
//! The operations exposed to callers. Definition writes persist first and
//! then schedule a background materialization; they never wait for it.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{ReportError, ReportResult};
use crate::materialize::{MaterializationFailure, MaterializationQueue};
use crate::observability::{Event, MetricsSnapshot};
use crate::plan::FieldInfoMap;
use crate::query::{QueryExecutor, ReportDownload, ReportPage, ReportQuery};
use crate::report::{
    MaterializationStatus, ReportDefinition, ReportDraft, ReportId, ReportPatch,
};
use crate::tenant::Tenant;

/// Report operations of one tenant
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct ReportService {
    tenant: Arc<Tenant>,
    queue: MaterializationQueue,
    queries: QueryExecutor,
}

impl ReportService {
    pub fn new(tenant: Tenant) -> Self {
        let tenant = Arc::new(tenant);
        Self {
            queue: MaterializationQueue::start(tenant.clone()),
            queries: QueryExecutor::new(tenant.clone()),
            tenant,
        }
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.tenant.metrics.snapshot()
    }

    // ==================
    // Definitions
    // ==================

    /// Saves a new definition and schedules its materialization.
    pub async fn create_report(&self, draft: ReportDraft, writer: &str) -> ReportResult<ReportDefinition> {
        let definition = draft.into_definition(writer, Utc::now());
        definition.validate()?;
        if self.tenant.reports.find(&definition.report_id).await?.is_some() {
            return Err(ReportError::Validation(format!(
                "report {} already exists",
                definition.report_id
            )));
        }
        self.tenant.reports.save(&definition).await?;
        self.schedule(definition)
    }

    /// Applies a patch and schedules re-materialization.
    ///
    /// The stored materialization status is not overwritten by the edit.
    pub async fn modify_report(
        &self,
        report_id: &str,
        patch: ReportPatch,
        writer: &str,
    ) -> ReportResult<ReportDefinition> {
        let report_id = ReportId::parse(report_id)?;
        let mut definition = self.tenant.reports.load(&report_id).await?;
        patch.apply(&mut definition, writer, Utc::now());
        definition.validate()?;
        self.tenant.reports.update(&definition).await?;
        self.schedule(definition)
    }

    fn schedule(&self, mut definition: ReportDefinition) -> ReportResult<ReportDefinition> {
        info!(
            event = %Event::ReportSaved,
            tenant = %self.tenant.name,
            report_id = %definition.report_id,
        );
        let generation = self.queue.submit(&definition.report_id)?;
        definition.materialization =
            MaterializationStatus::scheduled(generation, &definition.materialization);
        Ok(definition)
    }

    /// Soft delete; the materialized rows are kept.
    pub async fn delete_report(&self, report_id: &str, writer: &str) -> ReportResult<()> {
        let report_id = ReportId::parse(report_id)?;
        let mut definition = self.tenant.reports.load(&report_id).await?;
        definition.deleted_at = Some(Utc::now());
        definition.deleted_by = writer.to_string();
        self.tenant.reports.update(&definition).await?;
        info!(event = %Event::ReportDeleted, report_id = %report_id, hard = false);
        Ok(())
    }

    /// Removes the definition and its materialized collection.
    ///
    /// Runs already in flight are superseded and cannot republish the rows.
    /// Returns whether the definition existed.
    pub async fn hard_delete_report(&self, report_id: &str) -> ReportResult<bool> {
        let report_id = ReportId::parse(report_id)?;
        let removal = async {
            let existed = self.tenant.reports.remove(&report_id).await?;
            self.tenant
                .store
                .drop_collection(&report_id.collection())
                .await
                .map_err(ReportError::store("drop report rows"))?;
            Ok::<_, ReportError>(existed)
        };
        let existed = self.queue.retire(&report_id, removal).await?;
        info!(event = %Event::ReportDeleted, report_id = %report_id, hard = true, existed);
        Ok(existed)
    }

    pub async fn get_report(&self, report_id: &str) -> ReportResult<ReportDefinition> {
        self.tenant.reports.load(&ReportId::parse(report_id)?).await
    }

    /// Active reports of an app, optionally of one datastore.
    pub async fn list_reports(
        &self,
        app_id: &str,
        datastore_id: Option<&str>,
    ) -> ReportResult<Vec<ReportDefinition>> {
        self.tenant.reports.list(app_id, datastore_id).await
    }

    // ==================
    // Materialization
    // ==================

    /// Schedules a run; returns its generation.
    pub async fn generate_report_data(&self, report_id: &str) -> ReportResult<u64> {
        let report_id = ReportId::parse(report_id)?;
        self.tenant.reports.load(&report_id).await?;
        self.queue.submit(&report_id)
    }

    /// Schedules a run and waits for its outcome.
    pub async fn materialize_now(&self, report_id: &str) -> ReportResult<MaterializationStatus> {
        let report_id = ReportId::parse(report_id)?;
        self.tenant.reports.load(&report_id).await?;
        self.queue.submit_and_wait(&report_id).await
    }

    /// Queue status if the report ran here, else the persisted one.
    pub async fn materialization_status(&self, report_id: &str) -> ReportResult<MaterializationStatus> {
        let report_id = ReportId::parse(report_id)?;
        if let Some(status) = self.queue.status(&report_id) {
            return Ok(status);
        }
        Ok(self.tenant.reports.load(&report_id).await?.materialization)
    }

    pub fn subscribe_failures(&self) -> tokio::sync::broadcast::Receiver<MaterializationFailure> {
        self.queue.subscribe_failures()
    }

    // ==================
    // Queries
    // ==================

    pub async fn find_report_data(&self, query: &ReportQuery) -> ReportResult<ReportPage> {
        self.queries.find(query).await
    }

    pub async fn download_report_data(&self, query: &ReportQuery) -> ReportResult<ReportDownload> {
        self.queries.download(query).await
    }

    pub async fn find_count(&self, report_id: &str, owners: &[String]) -> ReportResult<(FieldInfoMap, u64)> {
        self.queries.count(report_id, owners).await
    }
}
