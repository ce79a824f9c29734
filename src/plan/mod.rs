//! Group/select plan building
//!
//! Turns a report definition into the stages that materialize it and the
//! presentation (label lookups, regrouping, sort, column metadata) applied
//! when its materialized rows are queried.

mod builder;
mod keys;

pub use builder::{PlanBuilder, Presentation};
pub use keys::{
    AggregateKey, FieldInfo, FieldInfoMap, GroupSpec, KeyInfo, Reduction, COUNT_COLUMN,
    COUNT_ORDER,
};
