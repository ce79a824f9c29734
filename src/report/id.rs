//! Report identifiers

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReportError, ReportResult};
use crate::store::report_collection;

const MAX_LEN: usize = 64;

/// Validated report id
///
/// Ids name the materialized collection, so they are restricted to
/// 1-64 ASCII letters, digits, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportId(String);

impl ReportId {
    pub fn parse(raw: &str) -> ReportResult<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ReportError::Validation(format!("invalid report id: {:?}", raw)));
        }
        Ok(ReportId(raw.to_string()))
    }

    /// Fresh random id
    pub fn generate() -> Self {
        ReportId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the materialized output collection
    pub fn collection(&self) -> String {
        report_collection(&self.0)
    }
}

impl TryFrom<String> for ReportId {
    type Error = ReportError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        ReportId::parse(&raw)
    }
}

impl From<ReportId> for String {
    fn from(id: ReportId) -> String {
        id.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
