//! One materialization run
//!
//! load definition -> compile conditions -> scan source -> run plan ->
//! replace `report_<id>`. The destination is only touched once the whole
//! pipeline has succeeded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::catalog::CatalogResolver;
use crate::condition::{CompileContext, CompileTarget, ConditionCompiler, Predicate};
use crate::document::Document;
use crate::error::{ReportError, ReportResult};
use crate::observability::Event;
use crate::pipeline::PipelineExecutor;
use crate::plan::PlanBuilder;
use crate::report::{ReportDefinition, ReportId, ReportMode};
use crate::store::{source_collection, FindOptions};
use crate::tenant::Tenant;

/// Rows computed for a report, not yet published
#[derive(Debug, Clone, PartialEq)]
pub enum Computed {
    Rows(Vec<Document>),
    /// Select mode without keys: nothing to publish
    Nothing,
}

/// Computes and publishes materialized rows
#[derive(Clone)]
pub struct Materializer {
    tenant: Arc<Tenant>,
    resolver: CatalogResolver,
    executor: PipelineExecutor,
}

impl Materializer {
    pub fn new(tenant: Arc<Tenant>) -> Self {
        Self {
            resolver: CatalogResolver::new(tenant.catalog.clone()),
            executor: PipelineExecutor::new(tenant.pipeline_context()),
            tenant,
        }
    }

    /// Runs the pipeline for a report without publishing.
    pub async fn compute(&self, report_id: &ReportId, now: DateTime<Utc>) -> ReportResult<Computed> {
        let definition = self.tenant.reports.load(report_id).await?;
        if matches!(&definition.mode, ReportMode::Select { select_key_infos } if select_key_infos.is_empty())
        {
            return Ok(Computed::Nothing);
        }
        self.compute_rows(&definition, now).await.map(Computed::Rows)
    }

    async fn compute_rows(&self, definition: &ReportDefinition, now: DateTime<Utc>) -> ReportResult<Vec<Document>> {
        let app_id = definition.app_id.as_str();
        let datastore_id = definition.datastore_id.as_str();

        let period = self.tenant.settings.processing_period(app_id).await?;
        let compiler = ConditionCompiler::new(
            CompileContext::new(CompileTarget::Source, now)
                .with_period(period)
                .with_strictness(self.tenant.config.strictness()),
        );
        let compiled = compiler.compile(&definition.report_conditions, &definition.condition_type)?;
        if compiled.skipped > 0 {
            self.tenant.metrics.add_conditions_skipped(compiled.skipped as u64);
        }

        let catalog = self.resolver.resolve(app_id, datastore_id).await?;
        let relations = self
            .tenant
            .catalog
            .datastore(app_id, datastore_id)
            .await?
            .map(|datastore| datastore.relations)
            .unwrap_or_default();

        // relation fields only exist after the joins
        let (scan, post_join) = if compiled.touches_relations {
            (Predicate::All, Some(compiled.predicate))
        } else {
            (compiled.predicate, None)
        };

        let stages = PlanBuilder::materialize(definition, &relations, catalog.root_fields(), post_join, now)?;

        let source = source_collection(datastore_id);
        let records = self
            .tenant
            .store
            .find(&source, &scan, &FindOptions::default())
            .await
            .map_err(ReportError::store("scan source records"))?;
        debug!(
            report_id = %definition.report_id,
            collection = %source,
            records = records.len(),
            stages = stages.len(),
            "source scanned"
        );

        self.executor.run(records, &stages).await
    }

    /// Swaps the report's materialized collection for `rows`.
    pub async fn publish(&self, report_id: &ReportId, rows: Vec<Document>) -> ReportResult<u64> {
        let count = rows.len() as u64;
        let collection = report_id.collection();
        self.tenant
            .store
            .replace_collection(&collection, rows)
            .await
            .map_err(ReportError::store("publish report rows"))?;
        info!(
            event = %Event::MaterializePublished,
            tenant = %self.tenant.name,
            report_id = %report_id,
            collection = %collection,
            rows = count,
        );
        Ok(count)
    }

    /// Computes and publishes in one go, bounded by the materialize timeout.
    ///
    /// Returns the number of rows published, `None` when skipped.
    pub async fn run(&self, report_id: &ReportId) -> ReportResult<Option<u64>> {
        let timeout = self.tenant.config.materialize_timeout();
        let work = async {
            match self.compute(report_id, self.tenant.now()).await? {
                Computed::Rows(rows) => self.publish(report_id, rows).await.map(Some),
                Computed::Nothing => Ok(None),
            }
        };
        tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| ReportError::Timeout {
                operation: "materialize",
                elapsed: timeout,
            })?
    }
}
