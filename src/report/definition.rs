//! Report definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ReportId;
use super::status::MaterializationStatus;
use crate::condition::FilterCondition;
use crate::error::{ReportError, ReportResult};
use crate::plan::{GroupSpec, KeyInfo};
use crate::value::DataType;

/// Grouped or flat output, exactly one per report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReportMode {
    Group {
        #[serde(default)]
        group_info: GroupSpec,
    },
    Select {
        #[serde(default)]
        select_key_infos: Vec<KeyInfo>,
    },
}

impl ReportMode {
    pub fn is_group(&self) -> bool {
        matches!(self, ReportMode::Group { .. })
    }

    fn validate(&self) -> ReportResult<()> {
        let keys: Vec<&KeyInfo> = match self {
            ReportMode::Group { group_info } => {
                for aggregate in &group_info.aggre_keys {
                    if aggregate.key.data_type != DataType::Number {
                        return Err(ReportError::Validation(format!(
                            "aggregate key {} must be numeric, found {}",
                            aggregate.key.field_id, aggregate.key.data_type
                        )));
                    }
                }
                group_info
                    .group_keys
                    .iter()
                    .chain(group_info.aggre_keys.iter().map(|a| &a.key))
                    .collect()
            }
            ReportMode::Select { select_key_infos } => select_key_infos.iter().collect(),
        };

        for key in keys {
            if key.field_id.is_empty() {
                return Err(ReportError::Validation("key without field_id".into()));
            }
            if key.is_lookup && key.relation_ref().is_none() {
                return Err(ReportError::Validation(format!(
                    "lookup key {} must be relation#field",
                    key.field_id
                )));
            }
        }
        Ok(())
    }
}

/// A stored report definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub report_id: ReportId,
    #[serde(default)]
    pub domain: String,
    pub app_id: String,
    pub datastore_id: String,
    #[serde(default)]
    pub report_name: String,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default)]
    pub report_conditions: Vec<FilterCondition>,
    /// Combinator of `report_conditions` (`and` / `or`)
    #[serde(default)]
    pub condition_type: String,
    #[serde(flatten)]
    pub mode: ReportMode,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: String,
    /// Set once soft-deleted
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by: String,
    #[serde(default)]
    pub materialization: MaterializationStatus,
}

impl ReportDefinition {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn validate(&self) -> ReportResult<()> {
        if self.app_id.is_empty() {
            return Err(ReportError::Validation("app_id is required".into()));
        }
        if self.datastore_id.is_empty() {
            return Err(ReportError::Validation("datastore_id is required".into()));
        }
        if let Some(condition) = self.report_conditions.iter().find(|c| c.field_id.is_empty()) {
            return Err(ReportError::Validation(format!(
                "condition without field_id (operator {:?})",
                condition.operator
            )));
        }
        self.mode.validate()
    }

    /// Selected keys, empty in group mode
    pub fn select_keys(&self) -> &[KeyInfo] {
        match &self.mode {
            ReportMode::Select { select_key_infos } => select_key_infos,
            ReportMode::Group { .. } => &[],
        }
    }

    pub fn group_spec(&self) -> Option<&GroupSpec> {
        match &self.mode {
            ReportMode::Group { group_info } => Some(group_info),
            ReportMode::Select { .. } => None,
        }
    }
}

/// Input of report creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    /// Generated when absent
    #[serde(default)]
    pub report_id: Option<ReportId>,
    #[serde(default)]
    pub domain: String,
    pub app_id: String,
    pub datastore_id: String,
    #[serde(default)]
    pub report_name: String,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default)]
    pub report_conditions: Vec<FilterCondition>,
    #[serde(default)]
    pub condition_type: String,
    #[serde(flatten)]
    pub mode: ReportMode,
}

impl ReportDraft {
    pub fn into_definition(self, writer: &str, now: DateTime<Utc>) -> ReportDefinition {
        ReportDefinition {
            report_id: self.report_id.unwrap_or_else(ReportId::generate),
            domain: self.domain,
            app_id: self.app_id,
            datastore_id: self.datastore_id,
            report_name: self.report_name,
            display_order: self.display_order,
            report_conditions: self.report_conditions,
            condition_type: self.condition_type,
            mode: self.mode,
            created_at: now,
            created_by: writer.to_string(),
            updated_at: now,
            updated_by: writer.to_string(),
            deleted_at: None,
            deleted_by: String::new(),
            materialization: MaterializationStatus::default(),
        }
    }
}

/// Partial update; `None` leaves a property unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportPatch {
    #[serde(default)]
    pub datastore_id: Option<String>,
    #[serde(default)]
    pub report_name: Option<String>,
    #[serde(default)]
    pub display_order: Option<i64>,
    #[serde(default)]
    pub report_conditions: Option<Vec<FilterCondition>>,
    #[serde(default)]
    pub condition_type: Option<String>,
    #[serde(default)]
    pub mode: Option<ReportMode>,
}

impl ReportPatch {
    pub fn apply(self, definition: &mut ReportDefinition, writer: &str, now: DateTime<Utc>) {
        if let Some(datastore_id) = self.datastore_id.filter(|d| !d.is_empty()) {
            definition.datastore_id = datastore_id;
        }
        if let Some(name) = self.report_name {
            definition.report_name = name;
        }
        if let Some(order) = self.display_order {
            definition.display_order = order;
        }
        if let Some(conditions) = self.report_conditions {
            definition.report_conditions = conditions;
        }
        if let Some(condition_type) = self.condition_type {
            definition.condition_type = condition_type;
        }
        if let Some(mode) = self.mode {
            definition.mode = mode;
        }
        definition.updated_at = now;
        definition.updated_by = writer.to_string();
    }
}
