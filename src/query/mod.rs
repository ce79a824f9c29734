//! Query execution against materialized reports
//!
//! Every query is restricted to the caller's owners, compiled against the
//! materialized row shape and served through an index provisioned for its
//! key-set.

mod executor;
mod types;

pub use executor::QueryExecutor;
pub use types::{ReportDownload, ReportPage, ReportQuery};
