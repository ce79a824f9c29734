//! Document store errors

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Collection {0} is unavailable")]
    Unavailable(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Failed to decode document in {collection}: {reason}")]
    Decode { collection: String, reason: String },

    #[error("Collection {collection} already holds {limit} indexes")]
    IndexLimit { collection: String, limit: usize },

    #[error("Index {name} not found on {collection}")]
    IndexNotFound { collection: String, name: String },

    #[error("Invalid index specification: {0}")]
    InvalidIndex(String),
}

impl StoreError {
    pub fn decode(collection: &str, reason: impl std::fmt::Display) -> Self {
        StoreError::Decode {
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }
}
