//! report-engine - Dynamic report aggregation and materialization
//!
//! Report definitions are compiled into aggregation pipelines over a tenant's
//! datastore records. Results are materialized into per-report collections
//! and served back with owner filtering, ad-hoc conditions and paging.

pub mod catalog;
pub mod cli;
pub mod condition;
pub mod config;
pub mod directory;
pub mod document;
pub mod error;
pub mod index;
pub mod materialize;
pub mod observability;
pub mod pipeline;
pub mod plan;
pub mod query;
pub mod record;
pub mod report;
pub mod service;
pub mod store;
pub mod tenant;
pub mod value;

pub use config::EngineConfig;
pub use error::{ReportError, ReportResult};
pub use service::ReportService;
pub use tenant::Tenant;
