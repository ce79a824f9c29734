//! Condition compilation errors

use thiserror::Error;

use crate::value::DataType;

/// Result type for condition compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Raised only under strict compilation; lenient compilation skips instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Field type {field_type} is not filterable (field {field_id})")]
    UnsupportedFieldType {
        field_id: String,
        field_type: DataType,
    },

    #[error("Operator '{operator}' is not valid for {field_type} field {field_id}")]
    UnsupportedOperator {
        field_id: String,
        field_type: DataType,
        operator: String,
    },

    #[error("Search value '{value}' is not valid for {field_type} field {field_id}")]
    InvalidValue {
        field_id: String,
        field_type: DataType,
        value: String,
    },

    #[error("Unknown condition combinator: {0}")]
    UnknownCombinator(String),
}
