//! Queries over materialized report rows
//!
//! Select mode pushes sort, skip and limit down to the store and labels
//! only the returned page. Group mode reads every visible row, labels and
//! regroups them across owners, then sorts and pages in process.
//!
//! In select mode the row fetch and the total count run concurrently; in
//! group mode the total is the number of regrouped rows.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::types::{ReportDownload, ReportPage, ReportQuery};
use crate::condition::{CompileContext, CompileTarget, ConditionCompiler, Predicate};
use crate::document::Document;
use crate::error::{ReportError, ReportResult};
use crate::index::IndexManager;
use crate::observability::Event;
use crate::pipeline::{PipelineExecutor, Stage};
use crate::plan::{FieldInfoMap, PlanBuilder, Presentation};
use crate::report::{ReportDefinition, ReportId};
use crate::store::FindOptions;
use crate::tenant::Tenant;

/// Batches buffered ahead of a slow download consumer
const DOWNLOAD_BUFFER: usize = 4;

/// A query resolved against its report
struct Prepared {
    definition: ReportDefinition,
    collection: String,
    predicate: Predicate,
    presentation: Presentation,
}

/// Serves queries for one tenant
#[derive(Clone)]
pub struct QueryExecutor {
    tenant: Arc<Tenant>,
    pipeline: PipelineExecutor,
    indexes: IndexManager,
}

impl QueryExecutor {
    pub fn new(tenant: Arc<Tenant>) -> Self {
        Self {
            pipeline: PipelineExecutor::new(tenant.pipeline_context()),
            indexes: tenant.index_manager(),
            tenant,
        }
    }

    /// One page of rows plus the total across pages.
    pub async fn find(&self, query: &ReportQuery) -> ReportResult<ReportPage> {
        let started = Instant::now();
        let page = self
            .bounded("query", self.tenant.config.query_timeout(), self.find_inner(query))
            .await;
        match page {
            Ok(page) => {
                self.tenant.metrics.record_query(page.rows.len() as u64);
                info!(
                    event = %Event::QueryExecuted,
                    tenant = %self.tenant.name,
                    report_id = %query.report_id,
                    rows = page.rows.len(),
                    total = page.total,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                );
                Ok(page)
            }
            Err(err) => Err(self.rejected(&query.report_id, err)),
        }
    }

    /// Column metadata and number of rows visible to `owners`.
    pub async fn count(&self, report_id: &str, owners: &[String]) -> ReportResult<(FieldInfoMap, u64)> {
        let query = ReportQuery::new(report_id, owners.to_vec());
        let work = async {
            let prepared = self.prepare(&query).await?;
            let total = if prepared.definition.mode.is_group() {
                self.presented_rows(&prepared).await?.len() as u64
            } else {
                self.tenant
                    .store
                    .count(&prepared.collection, &prepared.predicate)
                    .await
                    .map_err(ReportError::store("count report rows"))?
            };
            Ok((prepared.presentation.field_infos, total))
        };
        self.bounded("count", self.tenant.config.query_timeout(), work)
            .await
            .map_err(|err| self.rejected(report_id, err))
    }

    /// Every row matching the query, streamed in batches.
    ///
    /// Paging fields of `query` are ignored. Rows are produced by a
    /// background task bounded by the download timeout.
    pub async fn download(&self, query: &ReportQuery) -> ReportResult<ReportDownload> {
        let prepared = self
            .prepare(query)
            .await
            .map_err(|err| self.rejected(&query.report_id, err))?;
        let field_infos = prepared.presentation.field_infos.clone();
        let (sender, receiver) = mpsc::channel(DOWNLOAD_BUFFER);

        info!(
            event = %Event::DownloadStarted,
            tenant = %self.tenant.name,
            report_id = %query.report_id,
        );
        let producer = self.clone();
        let report_id = query.report_id.clone();
        tokio::spawn(async move {
            let timeout = producer.tenant.config.download_timeout();
            let produced = producer.bounded("download", timeout, producer.produce(prepared, &sender));
            if let Err(err) = produced.await {
                warn!(
                    event = %Event::DownloadFailed,
                    report_id = %report_id,
                    code = err.code(),
                    error = %err,
                );
                let _ = sender.send(Err(err)).await;
            }
        });

        let rows = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|batch| (batch, receiver))
        })
        .boxed();
        Ok(ReportDownload { field_infos, rows })
    }

    async fn produce(
        &self,
        prepared: Prepared,
        sender: &mpsc::Sender<ReportResult<Vec<Document>>>,
    ) -> ReportResult<()> {
        let batch_size = self.tenant.config.download_batch_size.max(1);

        if prepared.definition.mode.is_group() {
            let rows = self.presented_rows(&prepared).await?;
            let mut rows = rows.into_iter().peekable();
            while rows.peek().is_some() {
                let batch: Vec<Document> = rows.by_ref().take(batch_size).collect();
                if sender.send(Ok(batch)).await.is_err() {
                    // consumer went away
                    return Ok(());
                }
            }
            return Ok(());
        }

        let lookups = prepared.presentation.lookup_stages();
        let mut skip = 0u64;
        loop {
            let options = FindOptions::sorted(prepared.presentation.sort.clone())
                .page(skip, Some(batch_size as u64));
            let rows = self
                .tenant
                .store
                .find(&prepared.collection, &prepared.predicate, &options)
                .await
                .map_err(ReportError::store("read report rows"))?;
            let fetched = rows.len();
            if fetched == 0 {
                return Ok(());
            }
            let rows = self.pipeline.run(rows, &lookups).await?;
            if sender.send(Ok(rows)).await.is_err() {
                return Ok(());
            }
            if fetched < batch_size {
                return Ok(());
            }
            skip += fetched as u64;
        }
    }

    async fn find_inner(&self, query: &ReportQuery) -> ReportResult<ReportPage> {
        let prepared = self.prepare(query).await?;
        let (skip, limit) = query.window();

        let (rows, total) = if prepared.definition.mode.is_group() {
            let rows = self.presented_rows(&prepared).await?;
            let total = rows.len() as u64;
            let page = self.pipeline.run(rows, &[Stage::Page { skip, limit }]).await?;
            (page, total)
        } else {
            let options = FindOptions::sorted(prepared.presentation.sort.clone()).page(skip, limit);
            let store = &self.tenant.store;
            let (rows, total) = tokio::join!(
                store.find(&prepared.collection, &prepared.predicate, &options),
                store.count(&prepared.collection, &prepared.predicate),
            );
            let rows = rows.map_err(ReportError::store("read report rows"))?;
            let total = total.map_err(ReportError::store("count report rows"))?;
            let rows = self
                .pipeline
                .run(rows, &prepared.presentation.lookup_stages())
                .await?;
            (rows, total)
        };

        Ok(ReportPage {
            report_name: prepared.definition.report_name,
            rows,
            field_infos: prepared.presentation.field_infos,
            total,
        })
    }

    /// Group mode: every visible row, labelled, regrouped and sorted.
    async fn presented_rows(&self, prepared: &Prepared) -> ReportResult<Vec<Document>> {
        let rows = self
            .tenant
            .store
            .find(&prepared.collection, &prepared.predicate, &FindOptions::default())
            .await
            .map_err(ReportError::store("read report rows"))?;
        self.pipeline.run(rows, &prepared.presentation.stages()).await
    }

    async fn prepare(&self, query: &ReportQuery) -> ReportResult<Prepared> {
        let report_id = ReportId::parse(&query.report_id)?;
        let definition = self.tenant.reports.load(&report_id).await?;

        let period = self
            .tenant
            .settings
            .processing_period(&definition.app_id)
            .await?;
        let compiler = ConditionCompiler::new(
            CompileContext::new(CompileTarget::Materialized, self.tenant.now())
                .with_period(period)
                .with_strictness(self.tenant.config.strictness()),
        );
        let compiled = compiler.compile_adhoc(&query.conditions, &query.condition_type, &query.owners)?;
        if compiled.skipped > 0 {
            self.tenant.metrics.add_conditions_skipped(compiled.skipped as u64);
        }

        let presentation = PlanBuilder::presentation(&definition);
        let collection = report_id.collection();

        let mut index_keys = compiled.index_keys;
        for path in presentation.sort_paths() {
            if !index_keys.iter().any(|k| k == path) {
                index_keys.push(path.to_string());
            }
        }
        self.indexes
            .ensure_index_best_effort(&collection, &index_keys)
            .await;

        Ok(Prepared {
            definition,
            collection,
            predicate: compiled.predicate,
            presentation,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        timeout: std::time::Duration,
        work: impl Future<Output = ReportResult<T>>,
    ) -> ReportResult<T> {
        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(ReportError::Timeout {
                operation,
                elapsed: timeout,
            }),
        }
    }

    fn rejected(&self, report_id: &str, err: ReportError) -> ReportError {
        if err.is_client_error() {
            self.tenant.metrics.increment_queries_rejected();
            info!(
                event = %Event::QueryRejected,
                report_id,
                code = err.code(),
                reason = %err,
            );
        } else {
            warn!(report_id, code = err.code(), error = %err, "query failed");
        }
        err
    }
}
