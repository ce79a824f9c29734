//! Sorting of documents
//!
//! Ordering rules:
//! - missing == null < bool < number < string < array < object
//! - same types use natural ordering; arrays compare element-wise
//! - sorting is stable, so equal keys keep store order

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::get_path;

/// Sort direction, in the stored report-definition spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ascend", alias = "asc")]
    Ascending,
    #[serde(rename = "dscend", alias = "descend", alias = "desc")]
    Descending,
}

impl SortDirection {
    /// Index key direction (`1` / `-1`)
    pub fn index_direction(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub path: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Stable multi-key sort.
pub fn sort_documents(documents: &mut [Value], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    documents.sort_by(|a, b| compare_documents(a, b, keys));
}

/// Compares two documents on a list of sort keys.
pub fn compare_documents(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ordering = compare_values(get_path(a, &key.path), get_path(b, &key.path));
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Compares two optional JSON values; a missing value sorts as null.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);

    let type_order = |v: &Value| -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    };

    let (a_type, b_type) = (type_order(a), type_order(b));
    if a_type != b_type {
        return a_type.cmp(&b_type);
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let ordering = compare_values(Some(xv), Some(yv));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_ordering() {
        let null = json!(null);
        let num = json!(1);
        let text = json!("a");
        assert_eq!(compare_values(None, Some(&null)), Ordering::Equal);
        assert_eq!(compare_values(Some(&null), Some(&num)), Ordering::Less);
        assert_eq!(compare_values(Some(&num), Some(&text)), Ordering::Less);
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let mut docs = vec![
            json!({"k": 2, "id": "a"}),
            json!({"k": 1, "id": "b"}),
            json!({"k": 2, "id": "c"}),
            json!({"k": 1, "id": "d"}),
        ];
        sort_documents(&mut docs, &[SortKey::ascending("k")]);
        let ids: Vec<_> = docs.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_descending_secondary_key() {
        let mut docs = vec![
            json!({"k": 1, "n": 1}),
            json!({"k": 1, "n": 3}),
            json!({"k": 0, "n": 2}),
        ];
        sort_documents(
            &mut docs,
            &[SortKey::ascending("k"), SortKey::descending("n")],
        );
        let ns: Vec<_> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 1]);
    }

    #[test]
    fn test_arrays_compare_elementwise() {
        let a = json!(["ann", "bob"]);
        let b = json!(["ann", "cat"]);
        let c = json!(["ann"]);
        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(compare_values(Some(&c), Some(&a)), Ordering::Less);
    }

    #[test]
    fn test_direction_serde_spelling() {
        let asc: SortDirection = serde_json::from_value(json!("ascend")).unwrap();
        let desc: SortDirection = serde_json::from_value(json!("dscend")).unwrap();
        let alias: SortDirection = serde_json::from_value(json!("descend")).unwrap();
        assert_eq!(asc, SortDirection::Ascending);
        assert_eq!(desc, SortDirection::Descending);
        assert_eq!(alias, SortDirection::Descending);
        assert_eq!(desc.index_direction(), -1);
    }
}
