//! Report definitions
//!
//! A report is either grouped (group keys, aggregate keys, optional count)
//! or flat (selected keys). [`ReportMode`] makes the two mutually exclusive.

mod definition;
mod id;
mod repository;
mod status;

pub use definition::{ReportDefinition, ReportDraft, ReportMode, ReportPatch};
pub use id::ReportId;
pub use repository::{ReportRepository, StoreReportRepository};
pub use status::{MaterializationState, MaterializationStatus};
