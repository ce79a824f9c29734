//! Stage execution

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use super::shape::{group, page, project, regroup, select};
use super::stage::{Join, LabelLookup, LabelSource, Stage};
use crate::condition::Predicate;
use crate::directory::{EnumerationDirectory, IdentityDirectory};
use crate::document::{get_path, set_path, tuple_key, Document};
use crate::error::{ReportError, ReportResult};
use crate::store::{sort_documents, DocumentStore, FindOptions};

/// Collaborators stages read from
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn DocumentStore>,
    pub enumerations: Arc<dyn EnumerationDirectory>,
    pub identities: Arc<dyn IdentityDirectory>,
}

/// Runs stage lists over in-memory records
#[derive(Clone)]
pub struct PipelineExecutor {
    ctx: PipelineContext,
}

impl PipelineExecutor {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, mut rows: Vec<Document>, stages: &[Stage]) -> ReportResult<Vec<Document>> {
        for stage in stages {
            rows = match stage {
                Stage::Join(join) => self.join(rows, join).await?,
                Stage::Filter(predicate) => {
                    rows.retain(|row| predicate.matches(row));
                    rows
                }
                Stage::Project(projection) => project(rows, projection)?,
                Stage::Group(grouping) => group(&rows, grouping),
                Stage::Select(selection) => select(&rows, selection),
                Stage::Lookup(lookup) => self.lookup(rows, lookup).await?,
                Stage::Regroup(spec) => regroup(&rows, spec),
                Stage::Sort(keys) => {
                    sort_documents(&mut rows, keys);
                    rows
                }
                Stage::Page { skip, limit } => page(rows, *skip, *limit),
            };
            trace!(stage = stage_name(stage), rows = rows.len(), "stage done");
        }
        Ok(rows)
    }

    async fn join(&self, rows: Vec<Document>, join: &Join) -> ReportResult<Vec<Document>> {
        let related = self
            .ctx
            .store
            .find(&join.from, &Predicate::All, &FindOptions::default())
            .await
            .map_err(ReportError::store("load related records"))?;

        let mut by_key: HashMap<String, Vec<&Document>> = HashMap::new();
        for doc in &related {
            if let Some(key) = join_key(doc, join.on.iter().map(|k| k.foreign.as_str())) {
                by_key.entry(key).or_default().push(doc);
            }
        }

        let target = format!("relations.{}", join.relation_id);
        let mut joined = Vec::with_capacity(rows.len());
        for row in rows {
            let matches = join_key(&row, join.on.iter().map(|k| k.local.as_str()))
                .and_then(|key| by_key.get(&key));
            match matches {
                Some(docs) => {
                    for doc in docs {
                        let mut out = row.clone();
                        let items = doc.get("items").cloned().unwrap_or(Value::Null);
                        set_path(&mut out, &target, items);
                        joined.push(out);
                    }
                }
                None => joined.push(row),
            }
        }
        Ok(joined)
    }

    async fn lookup(&self, mut rows: Vec<Document>, lookup: &LabelLookup) -> ReportResult<Vec<Document>> {
        let cell_path = lookup.cell_path();
        let value_path = format!("{}.value", cell_path);

        match &lookup.source {
            LabelSource::Enumeration { app_id, option_id } => {
                let labels = self.ctx.enumerations.labels(app_id, option_id).await?;
                for row in &mut rows {
                    let label = get_path(row, &value_path)
                        .and_then(Value::as_str)
                        .and_then(|raw| labels.get(raw))
                        .map(|label| Value::String(label.clone()));
                    set_path(row, &cell_path, labeled_cell(lookup, label));
                }
            }
            LabelSource::Identity => {
                let mut ids = HashSet::new();
                for row in &rows {
                    ids.extend(user_ids(get_path(row, &value_path)));
                }
                let ids: Vec<String> = ids.into_iter().collect();
                let names = self.ctx.identities.display_names(&ids).await?;
                for row in &mut rows {
                    let resolved: Vec<Value> = user_ids(get_path(row, &value_path))
                        .into_iter()
                        .filter_map(|id| names.get(&id).cloned().map(Value::String))
                        .collect();
                    set_path(row, &cell_path, labeled_cell(lookup, Some(Value::Array(resolved))));
                }
            }
        }
        Ok(rows)
    }
}

fn labeled_cell(lookup: &LabelLookup, label: Option<Value>) -> Value {
    serde_json::json!({
        "data_type": lookup.data_type.as_str(),
        "value": label.unwrap_or(Value::Null),
    })
}

fn user_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(id)) if !id.is_empty() => vec![id.clone()],
        _ => Vec::new(),
    }
}

/// Canonical key of the values at `paths`; `None` if any is missing or null.
fn join_key<'a>(doc: &Document, paths: impl Iterator<Item = &'a str>) -> Option<String> {
    let values = paths
        .map(|path| get_path(doc, path).filter(|v| !v.is_null()))
        .collect::<Option<Vec<&Value>>>()?;
    let values: Vec<Option<&Value>> = values.into_iter().map(Some).collect();
    Some(tuple_key(&values))
}

fn stage_name(stage: &Stage) -> &'static str {
    match stage {
        Stage::Join(_) => "join",
        Stage::Filter(_) => "filter",
        Stage::Project(_) => "project",
        Stage::Group(_) => "group",
        Stage::Select(_) => "select",
        Stage::Lookup(_) => "lookup",
        Stage::Regroup(_) => "regroup",
        Stage::Sort(_) => "sort",
        Stage::Page { .. } => "page",
    }
}
