//! Aggregation pipeline
//!
//! Stage descriptors and their in-process execution: relation joins,
//! projections with function-field formulas, grouping, label lookups,
//! regrouping, sorting and paging.

mod executor;
mod formula;
mod shape;
mod stage;

pub use executor::{PipelineContext, PipelineExecutor};
pub use formula::{Formula, FormulaError};
pub use shape::UPDATE_TIME;
pub use stage::{
    Aggregation, ComputedField, Grouping, Join, JoinKey, LabelLookup, LabelSource, OutputKey,
    Projection, Regroup, RegroupAggregate, Selection, Stage, PARTIALS_PATH,
};
