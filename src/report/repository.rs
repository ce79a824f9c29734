//! Report definition persistence

use std::sync::Arc;

use async_trait::async_trait;

use super::definition::ReportDefinition;
use super::id::ReportId;
use super::status::MaterializationStatus;
use crate::condition::{Operand, Predicate};
use crate::document::Document;
use crate::error::{ReportError, ReportResult};
use crate::store::{DocumentStore, FindOptions, SortKey, StoreError, REPORTS};

/// Storage of report definitions
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Definition by id, soft-deleted ones included.
    async fn find(&self, report_id: &ReportId) -> ReportResult<Option<ReportDefinition>>;

    /// Active definitions of an app, by display order.
    async fn list(
        &self,
        app_id: &str,
        datastore_id: Option<&str>,
    ) -> ReportResult<Vec<ReportDefinition>>;

    /// Inserts or replaces a definition.
    async fn save(&self, definition: &ReportDefinition) -> ReportResult<()>;

    /// Writes the edited parts of an existing definition. The stored
    /// materialization status is kept. `NotFound` if the definition is gone.
    async fn update(&self, definition: &ReportDefinition) -> ReportResult<()>;

    /// Removes a definition. Returns whether it existed.
    async fn remove(&self, report_id: &ReportId) -> ReportResult<bool>;

    /// Updates only the materialization status of a definition.
    async fn record_status(
        &self,
        report_id: &ReportId,
        status: &MaterializationStatus,
    ) -> ReportResult<()>;

    /// Active definition, or `NotFound` when missing or soft-deleted.
    async fn load(&self, report_id: &ReportId) -> ReportResult<ReportDefinition> {
        match self.find(report_id).await? {
            Some(definition) if !definition.is_deleted() => Ok(definition),
            _ => Err(ReportError::not_found("report", report_id.as_str())),
        }
    }
}

/// [`ReportRepository`] over the `reports` collection
pub struct StoreReportRepository {
    store: Arc<dyn DocumentStore>,
}

impl StoreReportRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

const KEY_PATH: &str = "report_id";
const STATUS_PATH: &str = "materialization";

fn by_id(report_id: &ReportId) -> Predicate {
    Predicate::eq(KEY_PATH, Operand::Text(report_id.to_string()))
}

fn decode(document: Document) -> ReportResult<ReportDefinition> {
    serde_json::from_value(document)
        .map_err(|e| ReportError::store("decode report")(StoreError::decode(REPORTS, e)))
}

#[async_trait]
impl ReportRepository for StoreReportRepository {
    async fn find(&self, report_id: &ReportId) -> ReportResult<Option<ReportDefinition>> {
        let mut docs = self
            .store
            .find(REPORTS, &by_id(report_id), &FindOptions::default().page(0, Some(1)))
            .await
            .map_err(ReportError::store("find report"))?;
        docs.pop().map(decode).transpose()
    }

    async fn list(
        &self,
        app_id: &str,
        datastore_id: Option<&str>,
    ) -> ReportResult<Vec<ReportDefinition>> {
        let mut parts = vec![
            Predicate::eq("app_id", Operand::Text(app_id.into())),
            Predicate::NonEmpty {
                path: "deleted_at".into(),
                present: false,
            },
        ];
        if let Some(datastore_id) = datastore_id {
            parts.push(Predicate::eq("datastore_id", Operand::Text(datastore_id.into())));
        }
        let options =
            FindOptions::sorted(vec![SortKey::ascending("display_order"), SortKey::ascending(KEY_PATH)]);

        self.store
            .find(REPORTS, &Predicate::and(parts), &options)
            .await
            .map_err(ReportError::store("list reports"))?
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn save(&self, definition: &ReportDefinition) -> ReportResult<()> {
        let document = serde_json::to_value(definition)
            .map_err(|e| ReportError::Validation(format!("unserializable report: {}", e)))?;
        self.store
            .upsert(REPORTS, KEY_PATH, document)
            .await
            .map_err(ReportError::store("save report"))
    }

    async fn update(&self, definition: &ReportDefinition) -> ReportResult<()> {
        let document = serde_json::to_value(definition)
            .map_err(|e| ReportError::Validation(format!("unserializable report: {}", e)))?;
        let Document::Object(document) = document else {
            return Err(ReportError::Validation("report is not an object".into()));
        };
        let fields: Vec<(&str, Document)> = document
            .iter()
            .filter(|(path, _)| !matches!(path.as_str(), KEY_PATH | STATUS_PATH))
            .map(|(path, value)| (path.as_str(), value.clone()))
            .collect();

        let updated = self
            .store
            .update_many(REPORTS, &by_id(&definition.report_id), &fields)
            .await
            .map_err(ReportError::store("update report"))?;
        if updated == 0 {
            return Err(ReportError::not_found("report", definition.report_id.as_str()));
        }
        Ok(())
    }

    async fn remove(&self, report_id: &ReportId) -> ReportResult<bool> {
        let removed = self
            .store
            .delete_many(REPORTS, &by_id(report_id))
            .await
            .map_err(ReportError::store("remove report"))?;
        Ok(removed > 0)
    }

    async fn record_status(
        &self,
        report_id: &ReportId,
        status: &MaterializationStatus,
    ) -> ReportResult<()> {
        let value = serde_json::to_value(status)
            .map_err(|e| ReportError::Validation(format!("unserializable status: {}", e)))?;
        self.store
            .update_many(REPORTS, &by_id(report_id), &[(STATUS_PATH, value)])
            .await
            .map_err(ReportError::store("record materialization status"))?;
        Ok(())
    }
}
