//! Record shaping: projection, selection, grouping and regrouping
//!
//! Grouping keeps rows in key order (canonical tuple encoding), so output is
//! deterministic for identical input. Reductions only take numeric values:
//! a sum over no numbers is 0, the other reductions are null.

use std::collections::BTreeMap;

use serde_json::{json, Map, Number, Value};

use super::stage::{Grouping, OutputKey, Projection, Regroup, Selection, PARTIALS_PATH};
use crate::condition::OWNERS_PATH;
use crate::document::{get_path, set_path, tuple_key, Document};
use crate::error::{ReportError, ReportResult};
use crate::plan::{Reduction, COUNT_COLUMN};
use crate::value::{format_instant, DataType};

const ITEMS: &str = "items";
const ITEM_ID: &str = "item_id";
const RELATIONS: &str = "relations";
/// Materialization timestamp column
pub const UPDATE_TIME: &str = "update_time";

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    n: u64,
    max: Option<f64>,
    min: Option<f64>,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.n += 1;
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
    }

    fn absorb(&mut self, sum: f64, n: u64) {
        self.sum += sum;
        self.n += n;
    }

    fn output(&self, reduction: Reduction) -> Value {
        match reduction {
            Reduction::Sum => number(self.sum),
            Reduction::Avg if self.n > 0 => number(self.sum / self.n as f64),
            Reduction::Avg => Value::Null,
            Reduction::Max => self.max.map_or(Value::Null, number),
            Reduction::Min => self.min.map_or(Value::Null, number),
        }
    }

    fn partials(&self) -> Value {
        json!({"sum": self.sum, "n": self.n})
    }
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn cell(data_type: DataType, value: Option<&Value>) -> Value {
    let mut cell = Map::new();
    cell.insert("data_type".into(), Value::String(data_type.as_str().into()));
    if let Some(value) = value {
        cell.insert("value".into(), value.clone());
    }
    Value::Object(cell)
}

fn numeric_cell(value: Value) -> Value {
    json!({"data_type": DataType::Number.as_str(), "value": value})
}

fn item_path(field_id: &str) -> String {
    format!("{}.{}", ITEMS, field_id)
}

/// Writes a key value; a missing value leaves only the wrapping cell, if any.
fn write_key(row: &mut Document, key: &OutputKey, value: Option<&Value>) {
    match (key.wrap, value) {
        (Some(data_type), value) => set_path(row, &key.target, cell(data_type, value)),
        (None, Some(value)) => set_path(row, &key.target, value.clone()),
        (None, None) => {}
    }
}

fn copy_top(from: &Document, to: &mut Map<String, Value>, column: &str) {
    if let Some(value) = from.get(column) {
        to.insert(column.to_string(), value.clone());
    }
}

/// Applies a projection to joined source records.
pub fn project(records: Vec<Document>, projection: &Projection) -> ReportResult<Vec<Document>> {
    records
        .into_iter()
        .map(|record| {
            let mut out = Map::new();
            for column in &projection.columns {
                copy_top(&record, &mut out, column);
            }

            let source_items = record.get(ITEMS);
            let mut items = Map::new();
            for field_id in &projection.items {
                if let Some(cell) = source_items.and_then(|i| i.get(field_id)) {
                    items.insert(field_id.clone(), cell.clone());
                }
            }
            for computed in &projection.computed {
                let value = computed.formula.evaluate(&record).map_err(|source| {
                    ReportError::Formula {
                        field_id: computed.field_id.clone(),
                        source,
                    }
                })?;
                items.insert(
                    computed.field_id.clone(),
                    cell(computed.return_type, Some(&value)),
                );
            }
            out.insert(ITEMS.into(), Value::Object(items));

            if projection.keep_relations {
                copy_top(&record, &mut out, RELATIONS);
            }
            Ok(Value::Object(out))
        })
        .collect()
}

/// Flat rows
pub fn select(records: &[Document], selection: &Selection) -> Vec<Document> {
    let update_time = Value::String(format_instant(&selection.update_time));
    records
        .iter()
        .map(|record| {
            let mut row = Map::new();
            copy_top(record, &mut row, ITEM_ID);
            copy_top(record, &mut row, OWNERS_PATH);
            row.insert(UPDATE_TIME.into(), update_time.clone());

            let mut row = Value::Object(row);
            for key in &selection.keys {
                write_key(&mut row, key, get_path(record, &key.source));
            }
            row
        })
        .collect()
}

struct GroupState {
    row: Document,
    count: u64,
    accumulators: Vec<Accumulator>,
}

/// Aggregate rows, one per distinct (key tuple, owners)
pub fn group(records: &[Document], grouping: &Grouping) -> Vec<Document> {
    let mut groups: BTreeMap<String, GroupState> = BTreeMap::new();

    for record in records {
        let mut values: Vec<Option<&Value>> = grouping
            .keys
            .iter()
            .map(|key| get_path(record, &key.source))
            .collect();
        let owners = get_path(record, OWNERS_PATH);
        values.push(owners);

        let state = groups.entry(tuple_key(&values)).or_insert_with(|| {
            let mut row = json!({});
            for (key, value) in grouping.keys.iter().zip(&values) {
                write_key(&mut row, key, *value);
            }
            if let Some(owners) = owners {
                set_path(&mut row, OWNERS_PATH, owners.clone());
            }
            GroupState {
                row,
                count: 0,
                accumulators: vec![Accumulator::default(); grouping.aggregates.len()],
            }
        });

        state.count += 1;
        for (acc, aggregate) in state.accumulators.iter_mut().zip(&grouping.aggregates) {
            if let Some(value) = get_path(record, &aggregate.source).and_then(Value::as_f64) {
                acc.push(value);
            }
        }
    }

    let update_time = Value::String(format_instant(&grouping.update_time));
    groups
        .into_values()
        .map(|mut state| {
            for (acc, aggregate) in state.accumulators.iter().zip(&grouping.aggregates) {
                set_path(
                    &mut state.row,
                    &item_path(&aggregate.field_id),
                    numeric_cell(acc.output(aggregate.reduction)),
                );
                if aggregate.reduction == Reduction::Avg {
                    set_path(
                        &mut state.row,
                        &format!("{}.{}", PARTIALS_PATH, aggregate.field_id),
                        acc.partials(),
                    );
                }
            }
            if grouping.count {
                set_path(&mut state.row, COUNT_COLUMN, json!(state.count));
            }
            set_path(&mut state.row, UPDATE_TIME, update_time.clone());
            state.row
        })
        .collect()
}

/// Merges grouped rows sharing key values (and materialization time).
///
/// Sums add up, max/min combine, counts add up and averages are recomputed
/// from the stored partial sums and counts.
pub fn regroup(rows: &[Document], regroup: &Regroup) -> Vec<Document> {
    let mut groups: BTreeMap<String, GroupState> = BTreeMap::new();

    for row in rows {
        let mut values: Vec<Option<&Value>> =
            regroup.keys.iter().map(|path| get_path(row, path)).collect();
        values.push(get_path(row, UPDATE_TIME));

        let state = groups.entry(tuple_key(&values)).or_insert_with(|| {
            let mut merged = json!({});
            for (path, value) in regroup.keys.iter().zip(&values) {
                if let Some(value) = value {
                    set_path(&mut merged, path, (*value).clone());
                }
            }
            if let Some(update_time) = get_path(row, UPDATE_TIME) {
                set_path(&mut merged, UPDATE_TIME, update_time.clone());
            }
            GroupState {
                row: merged,
                count: 0,
                accumulators: vec![Accumulator::default(); regroup.aggregates.len()],
            }
        });

        state.count += get_path(row, COUNT_COLUMN)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        for (acc, aggregate) in state.accumulators.iter_mut().zip(&regroup.aggregates) {
            let value = get_path(row, &format!("{}.value", item_path(&aggregate.field_id)))
                .and_then(Value::as_f64);
            if aggregate.reduction == Reduction::Avg {
                let partial = get_path(row, &format!("{}.{}", PARTIALS_PATH, aggregate.field_id));
                let sum = partial.and_then(|p| p.get("sum")).and_then(Value::as_f64);
                let n = partial.and_then(|p| p.get("n")).and_then(Value::as_u64);
                match (sum, n, value) {
                    (Some(sum), Some(n), _) => acc.absorb(sum, n),
                    (_, _, Some(value)) => acc.push(value),
                    _ => {}
                }
            } else if let Some(value) = value {
                acc.push(value);
            }
        }
    }

    groups
        .into_values()
        .map(|mut state| {
            for (acc, aggregate) in state.accumulators.iter().zip(&regroup.aggregates) {
                set_path(
                    &mut state.row,
                    &item_path(&aggregate.field_id),
                    numeric_cell(acc.output(aggregate.reduction)),
                );
            }
            if regroup.count {
                set_path(&mut state.row, COUNT_COLUMN, json!(state.count));
            }
            state.row
        })
        .collect()
}

/// Skips and limits rows.
pub fn page(rows: Vec<Document>, skip: u64, limit: Option<u64>) -> Vec<Document> {
    let skip = usize::try_from(skip).unwrap_or(usize::MAX);
    let limit = limit
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    rows.into_iter().skip(skip).take(limit).collect()
}
