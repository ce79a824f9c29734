//! Source item records
//!
//! An item is one record of a datastore, stored in `item_<datastore_id>`.
//! Its dynamic fields live under `items`, each as a typed `{data_type, value}`
//! cell. Going through [`ItemRecord`] normalizes every cell.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::value::Value;

/// Static columns copied from source records into materialized rows
pub const STATIC_COLUMNS: &[&str] = &[
    "item_id",
    "app_id",
    "datastore_id",
    "owners",
    "check_type",
    "check_status",
    "created_at",
    "created_by",
    "updated_at",
    "updated_by",
    "checked_at",
    "checked_by",
    "label_time",
    "status",
];

/// A datastore record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: String,
    pub app_id: String,
    pub datastore_id: String,
    /// Access groups allowed to see this record
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub items: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_status: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ItemRecord {
    pub fn new(
        app_id: impl Into<String>,
        datastore_id: impl Into<String>,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            app_id: app_id.into(),
            datastore_id: datastore_id.into(),
            owners: Vec::new(),
            items: BTreeMap::new(),
            check_type: None,
            check_status: None,
            created_at: DateTime::<Utc>::default(),
            created_by: String::new(),
            updated_at: DateTime::<Utc>::default(),
            updated_by: String::new(),
            checked_at: None,
            checked_by: None,
            label_time: None,
            status: None,
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owners.push(owner.into());
        self
    }

    pub fn field(mut self, field_id: impl Into<String>, value: Value) -> Self {
        self.items.insert(field_id.into(), value);
        self
    }

    pub fn to_document(&self) -> Document {
        serde_json::to_value(self).unwrap_or(Document::Null)
    }

    /// Parses and normalizes a raw item document.
    pub fn from_document(document: Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(document)
    }
}

/// Normalizes a raw item document in one pass (numbers, dates, user lists).
pub fn normalize_item_document(document: Document) -> Result<Document, serde_json::Error> {
    serde_json::to_value(ItemRecord::from_document(document)?)
}
