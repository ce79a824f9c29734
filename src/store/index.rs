//! Secondary index descriptors

use serde::{Deserialize, Serialize};

/// One key of a composite index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    pub path: String,
    /// `1` ascending, `-1` descending
    pub direction: i32,
}

/// Composite index definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    /// Sparse, non-unique ascending index over `paths`.
    pub fn ascending<S: AsRef<str>>(paths: &[S]) -> Self {
        Self {
            keys: paths
                .iter()
                .map(|p| IndexKey {
                    path: p.as_ref().to_string(),
                    direction: 1,
                })
                .collect(),
            sparse: true,
            unique: false,
        }
    }

    /// Store-style generated name: `owners_1_items.f1.value_1`
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}_{}", k.path, k.direction))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.path.as_str())
    }

    /// Same key paths and directions, ignoring options.
    pub fn same_keys(&self, other: &IndexSpec) -> bool {
        self.keys == other.keys
    }
}

/// Index catalog entry with its access counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUsage {
    pub name: String,
    pub spec: IndexSpec,
    /// Times the store chose this index to serve a read
    pub accesses: u64,
}
