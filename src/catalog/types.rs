//! Field and datastore metadata

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::DataType;

/// Field definition of a datastore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub field_id: String,
    pub app_id: String,
    pub datastore_id: String,
    #[serde(default)]
    pub field_name: String,
    pub field_type: DataType,
    /// App of the referenced datastore; empty means the same app
    #[serde(default)]
    pub lookup_app_id: String,
    #[serde(default)]
    pub lookup_datastore_id: String,
    #[serde(default)]
    pub lookup_field_id: String,
    #[serde(default)]
    pub option_id: String,
    #[serde(default)]
    pub user_group_id: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub display_order: i64,
    /// Output type of a function field
    #[serde(default)]
    pub return_type: Option<DataType>,
    /// Declarative expression (JSON text) of a function field
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_by: Option<String>,
}

impl Field {
    pub fn new(
        app_id: impl Into<String>,
        datastore_id: impl Into<String>,
        field_id: impl Into<String>,
        field_type: DataType,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            app_id: app_id.into(),
            datastore_id: datastore_id.into(),
            field_name: String::new(),
            field_type,
            lookup_app_id: String::new(),
            lookup_datastore_id: String::new(),
            lookup_field_id: String::new(),
            option_id: String::new(),
            user_group_id: String::new(),
            unique: false,
            display_order: 0,
            return_type: None,
            formula: None,
            created_at: DateTime::<Utc>::default(),
            deleted_by: None,
        }
    }

    /// Not soft-deleted
    pub fn is_active(&self) -> bool {
        self.deleted_by.as_deref().map_or(true, str::is_empty)
    }

    pub fn is_function(&self) -> bool {
        self.field_type == DataType::Function
    }

    /// Type of the stored value; function fields store their return type.
    pub fn value_type(&self) -> DataType {
        match (self.field_type, self.return_type) {
            (DataType::Function, Some(return_type)) => return_type,
            (field_type, _) => field_type,
        }
    }

    /// `(app_id, datastore_id)` referenced by a lookup field
    pub fn lookup_target(&self) -> Option<(&str, &str)> {
        if self.field_type != DataType::Lookup || self.lookup_datastore_id.is_empty() {
            return None;
        }
        let app = if self.lookup_app_id.is_empty() {
            self.app_id.as_str()
        } else {
            self.lookup_app_id.as_str()
        };
        Some((app, self.lookup_datastore_id.as_str()))
    }
}

/// Declared relation between two datastores
///
/// Records join when every related field equals its local counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub relation_id: String,
    /// Related datastore
    pub datastore_id: String,
    /// related field id -> local field id
    pub fields: BTreeMap<String, String>,
}

/// Datastore metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    pub datastore_id: String,
    pub app_id: String,
    #[serde(default)]
    pub relations: Vec<Relation>,
}
