//! Stage descriptors
//!
//! Stages are plain data built by the plan builder and run, in order, by
//! [`super::PipelineExecutor`].

use chrono::{DateTime, Utc};

use super::formula::Formula;
use crate::condition::Predicate;
use crate::plan::Reduction;
use crate::store::SortKey;
use crate::value::DataType;

/// Top-level path holding average partials of grouped rows
pub const PARTIALS_PATH: &str = "partials";

/// One pipeline step
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Left join with a related datastore
    Join(Join),
    Filter(Predicate),
    /// Shapes joined source records
    Project(Projection),
    /// Groups source records into aggregate rows
    Group(Grouping),
    /// Shapes source records into flat rows
    Select(Selection),
    /// Replaces raw values with display labels
    Lookup(LabelLookup),
    /// Merges grouped rows across owners
    Regroup(Regroup),
    Sort(Vec<SortKey>),
    Page { skip: u64, limit: Option<u64> },
}

/// Equality of a local and a related path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKey {
    pub local: String,
    pub foreign: String,
}

/// Joins each record with the related records whose keys all match.
///
/// Matches land at `relations.<relation_id>` (the related record's `items`),
/// one output record per match. Records without a match are kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub relation_id: String,
    /// Related collection
    pub from: String,
    pub on: Vec<JoinKey>,
}

/// A function field computed from its formula
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedField {
    pub field_id: String,
    pub return_type: DataType,
    pub formula: Formula,
}

/// Keeps static columns and catalog fields, and computes function fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub columns: Vec<String>,
    /// Item field ids copied as whole cells
    pub items: Vec<String>,
    pub computed: Vec<ComputedField>,
    pub keep_relations: bool,
}

/// Where a key value is read from and written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputKey {
    pub source: String,
    pub target: String,
    /// Wraps a bare value into a `{data_type, value}` cell
    pub wrap: Option<DataType>,
}

/// One aggregate column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub field_id: String,
    /// Path of the numeric source value
    pub source: String,
    pub reduction: Reduction,
}

/// Group by key tuple plus owners
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    pub keys: Vec<OutputKey>,
    pub aggregates: Vec<Aggregation>,
    pub count: bool,
    pub update_time: DateTime<Utc>,
}

/// Flat rows: selected keys plus `item_id`, `owners` and `update_time`
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub keys: Vec<OutputKey>,
    pub update_time: DateTime<Utc>,
}

/// Directory a label comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    /// Option labels of one option set
    Enumeration { app_id: String, option_id: String },
    /// User display names
    Identity,
}

/// Label substitution for one item field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelLookup {
    pub field_id: String,
    pub data_type: DataType,
    pub source: LabelSource,
}

impl LabelLookup {
    pub fn cell_path(&self) -> String {
        format!("items.{}", self.field_id)
    }
}

/// Aggregate column merged by a regroup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegroupAggregate {
    pub field_id: String,
    pub reduction: Reduction,
}

/// Merges grouped rows that share key values once owners are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regroup {
    /// Paths of group key cells or columns
    pub keys: Vec<String>,
    pub aggregates: Vec<RegroupAggregate>,
    pub count: bool,
}
