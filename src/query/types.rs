//! Query inputs and results

use std::fmt;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::condition::FilterCondition;
use crate::document::Document;
use crate::error::ReportResult;
use crate::plan::FieldInfoMap;

fn first_page() -> u64 {
    1
}

/// Ad-hoc query against a materialized report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportQuery {
    pub report_id: String,
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
    /// `and` or `or`
    #[serde(default)]
    pub condition_type: String,
    /// Access groups of the caller; rows owned by none of them are hidden
    #[serde(default)]
    pub owners: Vec<String>,
    /// 1-based
    #[serde(default = "first_page")]
    pub page_index: u64,
    /// 0 returns every row
    #[serde(default)]
    pub page_size: u64,
}

impl ReportQuery {
    pub fn new(report_id: impl Into<String>, owners: Vec<String>) -> Self {
        Self {
            report_id: report_id.into(),
            conditions: Vec::new(),
            condition_type: "and".to_string(),
            owners,
            page_index: 1,
            page_size: 0,
        }
    }

    pub fn filtered(mut self, conditions: Vec<FilterCondition>, condition_type: &str) -> Self {
        self.conditions = conditions;
        self.condition_type = condition_type.to_string();
        self
    }

    pub fn page(mut self, page_index: u64, page_size: u64) -> Self {
        self.page_index = page_index;
        self.page_size = page_size;
        self
    }

    /// `(skip, limit)` of the requested page
    pub fn window(&self) -> (u64, Option<u64>) {
        if self.page_size == 0 {
            return (0, None);
        }
        let index = self.page_index.max(1);
        ((index - 1).saturating_mul(self.page_size), Some(self.page_size))
    }
}

/// One page of a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPage {
    pub report_name: String,
    pub rows: Vec<Document>,
    pub field_infos: FieldInfoMap,
    /// Rows matching the query across all pages
    pub total: u64,
}

/// Streamed rows of a whole report
pub struct ReportDownload {
    pub field_infos: FieldInfoMap,
    /// Batches of `download_batch_size` rows; an error ends the stream
    pub rows: BoxStream<'static, ReportResult<Vec<Document>>>,
}

impl fmt::Debug for ReportDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportDownload")
            .field("field_infos", &self.field_infos)
            .finish_non_exhaustive()
    }
}
