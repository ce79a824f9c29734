//! Typed values for dynamic item fields
//!
//! Every dynamic field on an item is stored as a `{data_type, value}` cell.
//! `Value` is the tagged form of that cell. Conversion from a raw cell
//! normalizes the payload once, at ingestion:
//!
//! - numbers become `f64` (numeric strings are parsed)
//! - dates become UTC instants (`YYYY-MM-DD` means midnight UTC)
//! - users become a list of ids (comma-separated strings are split)
//! - switches become booleans (`"true"`/`"false"` accepted)
//!
//! Downstream stages (predicates, reductions, sorting) rely on this and
//! never coerce again.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Field type tag shared by fields, conditions, keys and output columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Textarea,
    Number,
    Autonum,
    Date,
    Datetime,
    Time,
    Switch,
    Options,
    User,
    File,
    Lookup,
    Function,
    /// Static item column holding an item type code
    Type,
    /// Static item column holding a check status
    Check,
    #[serde(other)]
    Unknown,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Textarea => "textarea",
            DataType::Number => "number",
            DataType::Autonum => "autonum",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Time => "time",
            DataType::Switch => "switch",
            DataType::Options => "options",
            DataType::User => "user",
            DataType::File => "file",
            DataType::Lookup => "lookup",
            DataType::Function => "function",
            DataType::Type => "type",
            DataType::Check => "check",
            DataType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value conversion errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("Cannot read {found} as {data_type}")]
    TypeMismatch { data_type: DataType, found: String },

    #[error("Data type {0} cannot hold an item value")]
    Unsupported(DataType),
}

/// Attached file reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    #[serde(default)]
    pub name: String,
}

/// Raw `{data_type, value}` cell as stored in documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub data_type: DataType,
    #[serde(default)]
    pub value: JsonValue,
}

/// Tagged item value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Cell", into = "Cell")]
pub enum Value {
    Text(String),
    Textarea(String),
    Number(f64),
    Autonum(String),
    Date(DateTime<Utc>),
    Time(String),
    Switch(bool),
    Options(String),
    User(Vec<String>),
    File(Vec<FileRef>),
    Lookup(String),
    /// A typed cell with no payload
    Empty(DataType),
}

impl Value {
    /// Normalizes a raw payload into the typed value for `data_type`.
    pub fn normalize(data_type: DataType, raw: JsonValue) -> Result<Value, ValueError> {
        if raw.is_null() {
            return Ok(Value::Empty(data_type));
        }

        let mismatch = |raw: &JsonValue| ValueError::TypeMismatch {
            data_type,
            found: raw.to_string(),
        };

        match data_type {
            DataType::Text => text_of(&raw).map(Value::Text).ok_or_else(|| mismatch(&raw)),
            DataType::Textarea => text_of(&raw)
                .map(Value::Textarea)
                .ok_or_else(|| mismatch(&raw)),
            DataType::Autonum => text_of(&raw)
                .map(Value::Autonum)
                .ok_or_else(|| mismatch(&raw)),
            DataType::Time => text_of(&raw).map(Value::Time).ok_or_else(|| mismatch(&raw)),
            DataType::Options => text_of(&raw)
                .map(Value::Options)
                .ok_or_else(|| mismatch(&raw)),
            DataType::Lookup => text_of(&raw)
                .map(Value::Lookup)
                .ok_or_else(|| mismatch(&raw)),
            DataType::Number => number_of(&raw)
                .map(Value::Number)
                .ok_or_else(|| mismatch(&raw)),
            DataType::Date | DataType::Datetime => raw
                .as_str()
                .and_then(parse_instant)
                .map(Value::Date)
                .ok_or_else(|| mismatch(&raw)),
            DataType::Switch => match &raw {
                JsonValue::Bool(b) => Ok(Value::Switch(*b)),
                JsonValue::String(s) => s
                    .trim()
                    .parse::<bool>()
                    .map(Value::Switch)
                    .map_err(|_| mismatch(&raw)),
                _ => Err(mismatch(&raw)),
            },
            DataType::User => match &raw {
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| text_of(item).ok_or_else(|| mismatch(&raw)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::User),
                JsonValue::String(s) => Ok(Value::User(split_list(s))),
                _ => Err(mismatch(&raw)),
            },
            DataType::File => {
                let parsed = match &raw {
                    JsonValue::String(s) if s.is_empty() => Ok(Vec::new()),
                    JsonValue::String(s) => serde_json::from_str::<Vec<FileRef>>(s),
                    other => serde_json::from_value::<Vec<FileRef>>(other.clone()),
                };
                parsed.map(Value::File).map_err(|_| mismatch(&raw))
            }
            DataType::Function | DataType::Type | DataType::Check | DataType::Unknown => {
                Err(ValueError::Unsupported(data_type))
            }
        }
    }

    /// Returns the data type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Text(_) => DataType::Text,
            Value::Textarea(_) => DataType::Textarea,
            Value::Number(_) => DataType::Number,
            Value::Autonum(_) => DataType::Autonum,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::Switch(_) => DataType::Switch,
            Value::Options(_) => DataType::Options,
            Value::User(_) => DataType::User,
            Value::File(_) => DataType::File,
            Value::Lookup(_) => DataType::Lookup,
            Value::Empty(data_type) => *data_type,
        }
    }

    /// Returns the payload in stored (JSON) form.
    pub fn payload(&self) -> JsonValue {
        match self {
            Value::Text(s)
            | Value::Textarea(s)
            | Value::Autonum(s)
            | Value::Time(s)
            | Value::Options(s)
            | Value::Lookup(s) => JsonValue::String(s.clone()),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Date(instant) => JsonValue::String(format_instant(instant)),
            Value::Switch(b) => JsonValue::Bool(*b),
            Value::User(ids) => {
                JsonValue::Array(ids.iter().cloned().map(JsonValue::String).collect())
            }
            Value::File(files) => serde_json::to_value(files).unwrap_or(JsonValue::Null),
            Value::Empty(_) => JsonValue::Null,
        }
    }

    /// Numeric view used by reductions.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Human readable rendering for exports.
    pub fn render(&self) -> String {
        match self {
            Value::Text(s)
            | Value::Textarea(s)
            | Value::Autonum(s)
            | Value::Time(s)
            | Value::Options(s)
            | Value::Lookup(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Date(instant) => instant.format("%Y-%m-%d").to_string(),
            Value::Switch(b) => b.to_string(),
            Value::User(ids) => ids.join(","),
            Value::File(files) => files
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(","),
            Value::Empty(_) => String::new(),
        }
    }
}

impl TryFrom<Cell> for Value {
    type Error = ValueError;

    fn try_from(cell: Cell) -> Result<Self, Self::Error> {
        Value::normalize(cell.data_type, cell.value)
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        Cell {
            data_type: value.data_type(),
            value: value.payload(),
        }
    }
}

/// Parses `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339 text into a UTC instant.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical stored form of an instant.
///
/// Fixed width so stored instants also order correctly as text.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn text_of(raw: &JsonValue) -> Option<String> {
    match raw {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_of(raw: &JsonValue) -> Option<f64> {
    match raw {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
