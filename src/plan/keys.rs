//! Group, aggregate and selection keys of a report

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::store::SortDirection;
use crate::value::DataType;

/// Output column metadata, keyed by column id
pub type FieldInfoMap = BTreeMap<String, FieldInfo>;

/// Column id of the per-group row count
pub const COUNT_COLUMN: &str = "count";

/// Display order of the count column; always last
pub const COUNT_ORDER: i64 = 10000;

/// A field used as a group key or a selected column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Field comes from a related datastore; `field_id` is `relation#field`
    #[serde(default)]
    pub is_lookup: bool,
    pub field_id: String,
    #[serde(default)]
    pub datastore_id: String,
    pub data_type: DataType,
    #[serde(default)]
    pub option_id: String,
    #[serde(default)]
    pub alias_name: String,
    #[serde(default, deserialize_with = "optional_direction")]
    pub sort: Option<SortDirection>,
    #[serde(default = "default_dynamic")]
    pub is_dynamic: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub order: i64,
}

fn default_dynamic() -> bool {
    true
}

/// Accepts a missing, null or empty-string direction as "unsorted".
fn optional_direction<'de, D>(deserializer: D) -> Result<Option<SortDirection>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => serde_json::from_value(serde_json::Value::String(text.to_string()))
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl KeyInfo {
    /// Dynamic field key
    pub fn dynamic(field_id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            is_lookup: false,
            field_id: field_id.into(),
            datastore_id: String::new(),
            data_type,
            option_id: String::new(),
            alias_name: String::new(),
            sort: None,
            is_dynamic: true,
            unique: false,
            order: 0,
        }
    }

    /// Static column key
    pub fn fixed(column: impl Into<String>, data_type: DataType) -> Self {
        Self {
            is_dynamic: false,
            ..Self::dynamic(column, data_type)
        }
    }

    /// Related-datastore field key (`relation#field`)
    pub fn related(relation_id: &str, field_id: &str, data_type: DataType) -> Self {
        Self {
            is_lookup: true,
            ..Self::dynamic(format!("{}#{}", relation_id, field_id), data_type)
        }
    }

    pub fn sorted(mut self, direction: SortDirection) -> Self {
        self.sort = Some(direction);
        self
    }

    pub fn with_option(mut self, option_id: impl Into<String>) -> Self {
        self.option_id = option_id.into();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias_name = alias.into();
        self
    }

    /// `(relation_id, field_id)` of a lookup key
    pub fn relation_ref(&self) -> Option<(&str, &str)> {
        if !self.is_lookup {
            return None;
        }
        self.field_id.split_once('#')
    }

    /// Stored in `items` of materialized rows (dynamic and relation keys)
    pub fn is_item(&self) -> bool {
        self.is_lookup || self.is_dynamic
    }

    /// Path of the key's value in a joined source record.
    pub fn source_path(&self) -> String {
        match self.relation_ref() {
            Some((relation, field)) => format!("relations.{}.{}.value", relation, field),
            None if self.is_dynamic => format!("items.{}.value", self.field_id),
            None => self.field_id.clone(),
        }
    }

    /// Path of the key's whole cell (or column) in a materialized row.
    pub fn output_path(&self) -> String {
        if self.is_item() {
            format!("items.{}", self.field_id)
        } else {
            self.field_id.clone()
        }
    }

    /// Path of the key's value in a materialized row.
    pub fn value_path(&self) -> String {
        if self.is_item() {
            format!("items.{}.value", self.field_id)
        } else {
            self.field_id.clone()
        }
    }

    pub fn field_info(&self) -> FieldInfo {
        FieldInfo {
            data_type: self.data_type,
            alias_name: self.alias_name.clone(),
            datastore_id: self.datastore_id.clone(),
            is_dynamic: self.is_dynamic,
            option_id: self.option_id.clone(),
            unique: self.unique,
            order: self.order,
        }
    }
}

/// Reduction applied to an aggregate key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    Sum,
    Avg,
    Max,
    Min,
}

/// A numeric field reduced per group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateKey {
    #[serde(flatten)]
    pub key: KeyInfo,
    pub aggre_type: Reduction,
}

impl AggregateKey {
    pub fn new(key: KeyInfo, aggre_type: Reduction) -> Self {
        Self { key, aggre_type }
    }

    /// Aggregates are always numeric and dynamic in output.
    pub fn field_info(&self) -> FieldInfo {
        FieldInfo {
            data_type: DataType::Number,
            is_dynamic: true,
            unique: false,
            ..self.key.field_info()
        }
    }
}

/// Grouping of a grouped report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub group_keys: Vec<KeyInfo>,
    #[serde(default)]
    pub aggre_keys: Vec<AggregateKey>,
    /// Emit a per-group row count
    #[serde(default)]
    pub show_count: bool,
}

/// Metadata of one output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub data_type: DataType,
    #[serde(default)]
    pub alias_name: String,
    #[serde(default)]
    pub datastore_id: String,
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub option_id: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub order: i64,
}

impl FieldInfo {
    /// Metadata of the count column
    pub fn count() -> Self {
        FieldInfo {
            data_type: DataType::Number,
            alias_name: COUNT_COLUMN.to_string(),
            datastore_id: String::new(),
            is_dynamic: false,
            option_id: String::new(),
            unique: false,
            order: COUNT_ORDER,
        }
    }
}
