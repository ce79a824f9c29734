//! Plan builder
//!
//! Materialization plan: relation joins, optional post-join filter,
//! projection, then the group or select stage. Presentation: what a query
//! applies on top of materialized rows.

use chrono::{DateTime, Utc};

use super::keys::{FieldInfo, FieldInfoMap, KeyInfo, COUNT_COLUMN};
use crate::catalog::{Field, Relation};
use crate::condition::Predicate;
use crate::error::{ReportError, ReportResult};
use crate::pipeline::{
    Aggregation, ComputedField, Formula, Grouping, Join, JoinKey, LabelLookup, LabelSource,
    OutputKey, Projection, Regroup, RegroupAggregate, Selection, Stage, UPDATE_TIME,
};
use crate::record::STATIC_COLUMNS;
use crate::report::{ReportDefinition, ReportMode};
use crate::store::{source_collection, SortKey};
use crate::value::DataType;

const ITEM_ID: &str = "item_id";

/// Query-time treatment of a report's materialized rows
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    pub lookups: Vec<LabelLookup>,
    /// Group mode only
    pub regroup: Option<Regroup>,
    pub sort: Vec<SortKey>,
    pub field_infos: FieldInfoMap,
}

impl Presentation {
    pub fn lookup_stages(&self) -> Vec<Stage> {
        self.lookups.iter().cloned().map(Stage::Lookup).collect()
    }

    /// Lookups, regroup and sort, in that order.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = self.lookup_stages();
        if let Some(regroup) = &self.regroup {
            stages.push(Stage::Regroup(regroup.clone()));
        }
        stages.push(Stage::Sort(self.sort.clone()));
        stages
    }

    pub fn sort_paths(&self) -> impl Iterator<Item = &str> {
        self.sort.iter().map(|k| k.path.as_str())
    }
}

/// Builds plans from report definitions
pub struct PlanBuilder;

impl PlanBuilder {
    /// Stages turning scanned source records into materialized rows.
    ///
    /// `fields` are the active fields of the report's datastore. A
    /// `post_join_filter` runs right after the relation joins.
    pub fn materialize(
        definition: &ReportDefinition,
        relations: &[Relation],
        fields: &[Field],
        post_join_filter: Option<Predicate>,
        now: DateTime<Utc>,
    ) -> ReportResult<Vec<Stage>> {
        let mut stages: Vec<Stage> = relations
            .iter()
            .filter(|relation| !relation.fields.is_empty())
            .map(|relation| Stage::Join(join(relation)))
            .collect();
        let keep_relations = !stages.is_empty();

        if let Some(filter) = post_join_filter {
            stages.push(Stage::Filter(filter));
        }

        stages.push(Stage::Project(projection(fields, keep_relations)?));

        let shaping = match &definition.mode {
            ReportMode::Group { group_info } => Stage::Group(Grouping {
                keys: group_info.group_keys.iter().map(output_key).collect(),
                aggregates: group_info
                    .aggre_keys
                    .iter()
                    .map(|aggregate| Aggregation {
                        field_id: aggregate.key.field_id.clone(),
                        source: aggregate.key.source_path(),
                        reduction: aggregate.aggre_type,
                    })
                    .collect(),
                count: group_info.show_count,
                update_time: now,
            }),
            ReportMode::Select { select_key_infos } => Stage::Select(Selection {
                keys: select_key_infos.iter().map(output_key).collect(),
                update_time: now,
            }),
        };
        stages.push(shaping);
        Ok(stages)
    }

    pub fn presentation(definition: &ReportDefinition) -> Presentation {
        match &definition.mode {
            ReportMode::Group { group_info } => {
                let mut field_infos: FieldInfoMap = group_info
                    .group_keys
                    .iter()
                    .map(|key| (key.field_id.clone(), key.field_info()))
                    .collect();
                for aggregate in &group_info.aggre_keys {
                    field_infos.insert(aggregate.key.field_id.clone(), aggregate.field_info());
                }
                if group_info.show_count {
                    field_infos.insert(COUNT_COLUMN.to_string(), FieldInfo::count());
                }

                let all_keys = group_info
                    .group_keys
                    .iter()
                    .chain(group_info.aggre_keys.iter().map(|a| &a.key));
                let mut sort = explicit_sort(all_keys);
                if sort.is_empty() {
                    sort = group_info
                        .group_keys
                        .iter()
                        .filter(|key| key.data_type != DataType::User)
                        .map(|key| SortKey::ascending(key.value_path()))
                        .collect();
                }
                if sort.is_empty() {
                    sort.push(SortKey::ascending(UPDATE_TIME));
                }

                Presentation {
                    lookups: label_lookups(definition, &group_info.group_keys),
                    regroup: Some(Regroup {
                        keys: group_info.group_keys.iter().map(KeyInfo::output_path).collect(),
                        aggregates: group_info
                            .aggre_keys
                            .iter()
                            .map(|aggregate| RegroupAggregate {
                                field_id: aggregate.key.field_id.clone(),
                                reduction: aggregate.aggre_type,
                            })
                            .collect(),
                        count: group_info.show_count,
                    }),
                    sort,
                    field_infos,
                }
            }
            ReportMode::Select { select_key_infos } => {
                let mut sort = explicit_sort(select_key_infos.iter());
                if sort.is_empty() {
                    sort.push(SortKey::ascending(ITEM_ID));
                }
                Presentation {
                    lookups: label_lookups(definition, select_key_infos),
                    regroup: None,
                    sort,
                    field_infos: select_key_infos
                        .iter()
                        .map(|key| (key.field_id.clone(), key.field_info()))
                        .collect(),
                }
            }
        }
    }
}

fn join(relation: &Relation) -> Join {
    Join {
        relation_id: relation.relation_id.clone(),
        from: source_collection(&relation.datastore_id),
        on: relation
            .fields
            .iter()
            .map(|(related, local)| JoinKey {
                local: format!("items.{}.value", local),
                foreign: format!("items.{}.value", related),
            })
            .collect(),
    }
}

fn projection(fields: &[Field], keep_relations: bool) -> ReportResult<Projection> {
    let mut items = Vec::new();
    let mut computed = Vec::new();
    for field in fields {
        if !field.is_function() {
            items.push(field.field_id.clone());
            continue;
        }
        let formula = Formula::parse(field.formula.as_deref().unwrap_or_default()).map_err(
            |source| ReportError::Formula {
                field_id: field.field_id.clone(),
                source,
            },
        )?;
        computed.push(ComputedField {
            field_id: field.field_id.clone(),
            return_type: field.value_type(),
            formula,
        });
    }

    Ok(Projection {
        columns: STATIC_COLUMNS.iter().map(|c| c.to_string()).collect(),
        items,
        computed,
        keep_relations,
    })
}

/// Relation keys read a bare value and wrap it; item keys copy whole cells.
fn output_key(key: &KeyInfo) -> OutputKey {
    let wrap = key.relation_ref().map(|_| key.data_type);
    let source = match wrap {
        Some(_) => key.source_path(),
        None => key.output_path(),
    };
    OutputKey {
        source,
        target: key.output_path(),
        wrap,
    }
}

fn explicit_sort<'a>(keys: impl Iterator<Item = &'a KeyInfo>) -> Vec<SortKey> {
    keys.filter_map(|key| {
        key.sort.map(|direction| SortKey {
            path: key.value_path(),
            direction,
        })
    })
    .collect()
}

fn label_lookups(definition: &ReportDefinition, keys: &[KeyInfo]) -> Vec<LabelLookup> {
    keys.iter()
        .filter(|key| key.is_dynamic)
        .filter_map(|key| {
            let source = match key.data_type {
                DataType::User => LabelSource::Identity,
                DataType::Options => LabelSource::Enumeration {
                    app_id: definition.app_id.clone(),
                    option_id: key.option_id.clone(),
                },
                _ => return None,
            };
            Some(LabelLookup {
                field_id: key.field_id.clone(),
                data_type: key.data_type,
                source,
            })
        })
        .collect()
}
