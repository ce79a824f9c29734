//! Compiled predicate tree and its evaluation
//!
//! Evaluation follows document-store matching rules:
//! - a missing or null field never equals anything and always satisfies `<>`
//! - an array field matches when any element matches
//! - comparisons are typed; a type mismatch never matches

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::document::get_path;
use crate::value::{format_instant, parse_instant};

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Text(String),
    Number(f64),
    Bool(bool),
    Instant(DateTime<Utc>),
    /// Exact list equality (static multi-value columns)
    List(Vec<String>),
}

impl Operand {
    /// JSON form, for logging and explain output
    pub fn to_json(&self) -> Value {
        match self {
            Operand::Text(s) => Value::String(s.clone()),
            Operand::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Operand::Bool(b) => Value::Bool(*b),
            Operand::Instant(t) => Value::String(format_instant(t)),
            Operand::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every document
    All,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Compare {
        path: String,
        comparison: Comparison,
        operand: Operand,
    },
    /// Field (or any array element) is one of `values`
    In { path: String, values: Vec<String> },
    /// Text field contains `needle`
    Contains { path: String, needle: String },
    /// Field is present and non-empty (`present == true`), or the opposite
    NonEmpty { path: String, present: bool },
}

impl Predicate {
    pub fn compare(path: impl Into<String>, comparison: Comparison, operand: Operand) -> Self {
        Predicate::Compare {
            path: path.into(),
            comparison,
            operand,
        }
    }

    pub fn eq(path: impl Into<String>, operand: Operand) -> Self {
        Self::compare(path, Comparison::Eq, operand)
    }

    pub fn is_in(path: impl Into<String>, values: Vec<String>) -> Self {
        Predicate::In {
            path: path.into(),
            values,
        }
    }

    /// Conjunction; flattens trivial cases.
    pub fn and(mut parts: Vec<Predicate>) -> Self {
        parts.retain(|p| *p != Predicate::All);
        match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    /// Disjunction; an empty list matches everything (no condition).
    pub fn or(mut parts: Vec<Predicate>) -> Self {
        if parts.iter().any(|p| *p == Predicate::All) {
            return Predicate::All;
        }
        match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::Or(parts),
        }
    }

    /// Field paths referenced by this predicate, in first-seen order.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths(&self, out: &mut Vec<String>) {
        match self {
            Predicate::All => {}
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().for_each(|p| p.collect_paths(out));
            }
            Predicate::Compare { path, .. }
            | Predicate::In { path, .. }
            | Predicate::Contains { path, .. }
            | Predicate::NonEmpty { path, .. } => {
                if !out.contains(path) {
                    out.push(path.clone());
                }
            }
        }
    }

    /// Paths constrained by equality (or membership), used for index choice.
    pub fn equality_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_equality_paths(&mut out);
        out
    }

    fn collect_equality_paths(&self, out: &mut Vec<String>) {
        match self {
            Predicate::And(parts) => parts.iter().for_each(|p| p.collect_equality_paths(out)),
            Predicate::Compare {
                path,
                comparison: Comparison::Eq,
                ..
            }
            | Predicate::In { path, .. } => {
                if !out.contains(path) {
                    out.push(path.clone());
                }
            }
            _ => {}
        }
    }

    /// Evaluates the predicate against a document.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Predicate::All => true,
            Predicate::And(parts) => parts.iter().all(|p| p.matches(document)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(document)),
            Predicate::Compare {
                path,
                comparison,
                operand,
            } => compare_match(get_path(document, path), *comparison, operand),
            Predicate::In { path, values } => match get_path(document, path) {
                Some(Value::Array(items)) => items.iter().any(|item| in_list(item, values)),
                Some(value) => in_list(value, values),
                None => false,
            },
            Predicate::Contains { path, needle } => match get_path(document, path) {
                Some(Value::String(s)) => s.contains(needle.as_str()),
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| item.as_str().is_some_and(|s| s.contains(needle.as_str()))),
                _ => false,
            },
            Predicate::NonEmpty { path, present } => {
                let non_empty = match get_path(document, path) {
                    None | Some(Value::Null) => false,
                    Some(Value::Array(items)) => !items.is_empty(),
                    Some(Value::String(s)) => !s.is_empty() && s != "[]",
                    Some(_) => true,
                };
                non_empty == *present
            }
        }
    }
}

fn compare_match(actual: Option<&Value>, comparison: Comparison, operand: &Operand) -> bool {
    let actual = match actual {
        None | Some(Value::Null) => return comparison == Comparison::Ne,
        Some(v) => v,
    };

    if let Value::Array(items) = actual {
        // Whole-array equality first, then element-wise
        if let Operand::List(_) = operand {
            let equal = ordering(actual, operand) == Some(Ordering::Equal);
            return match comparison {
                Comparison::Eq => equal,
                Comparison::Ne => !equal,
                _ => false,
            };
        }
        return match comparison {
            Comparison::Ne => !items
                .iter()
                .any(|item| ordering(item, operand) == Some(Ordering::Equal)),
            _ => items
                .iter()
                .any(|item| satisfies(ordering(item, operand), comparison)),
        };
    }

    satisfies(ordering(actual, operand), comparison)
}

fn satisfies(ordering: Option<Ordering>, comparison: Comparison) -> bool {
    match comparison {
        Comparison::Eq => ordering == Some(Ordering::Equal),
        Comparison::Ne => ordering != Some(Ordering::Equal),
        Comparison::Gt => ordering == Some(Ordering::Greater),
        Comparison::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Lt => ordering == Some(Ordering::Less),
        Comparison::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    }
}

/// Typed ordering of a stored value against an operand; `None` on type mismatch.
fn ordering(actual: &Value, operand: &Operand) -> Option<Ordering> {
    match (actual, operand) {
        (Value::String(a), Operand::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Number(a), Operand::Number(b)) => a.as_f64()?.partial_cmp(b),
        (Value::Bool(a), Operand::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Operand::Instant(b)) => Some(parse_instant(a)?.cmp(b)),
        (Value::Array(items), Operand::List(expected)) => {
            let equal = items.len() == expected.len()
                && items
                    .iter()
                    .zip(expected)
                    .all(|(item, want)| item.as_str() == Some(want.as_str()));
            if equal {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
        (Value::String(a), Operand::List(expected)) if expected.len() == 1 => {
            Some(a.as_str().cmp(expected[0].as_str()))
        }
        _ => None,
    }
}

fn in_list(value: &Value, values: &[String]) -> bool {
    match value {
        Value::String(s) => values.iter().any(|v| v == s),
        Value::Number(n) => values.iter().any(|v| v == &n.to_string()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn make_doc(value: Value) -> Value {
        json!({"items": {"f1": {"value": value}}, "owners": ["g1", "g2"]})
    }

    const PATH: &str = "items.f1.value";

    #[test]
    fn test_missing_field_never_equal() {
        let doc = json!({});
        assert!(!Predicate::eq(PATH, Operand::Text("a".into())).matches(&doc));
        assert!(Predicate::compare(PATH, Comparison::Ne, Operand::Text("a".into())).matches(&doc));
        assert!(!Predicate::compare(PATH, Comparison::Gt, Operand::Number(1.0)).matches(&doc));
    }

    #[test]
    fn test_numeric_comparisons() {
        let doc = make_doc(json!(15.0));
        assert!(Predicate::compare(PATH, Comparison::Gte, Operand::Number(10.0)).matches(&doc));
        assert!(Predicate::compare(PATH, Comparison::Lt, Operand::Number(20.0)).matches(&doc));
        assert!(!Predicate::compare(PATH, Comparison::Gt, Operand::Number(15.0)).matches(&doc));
        assert!(Predicate::compare(PATH, Comparison::Lte, Operand::Number(15.0)).matches(&doc));
    }

    #[test]
    fn test_integer_and_float_forms_compare_equal() {
        let doc = make_doc(json!(3));
        assert!(Predicate::eq(PATH, Operand::Number(3.0)).matches(&doc));
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let doc = make_doc(json!("15"));
        assert!(!Predicate::compare(PATH, Comparison::Gt, Operand::Number(1.0)).matches(&doc));
        assert!(!Predicate::eq(PATH, Operand::Number(15.0)).matches(&doc));
    }

    #[test]
    fn test_instant_comparison_parses_stored_text() {
        let doc = make_doc(json!("2024-03-05T10:00:00.000Z"));
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        let within = Predicate::and(vec![
            Predicate::compare(PATH, Comparison::Gte, Operand::Instant(start)),
            Predicate::compare(PATH, Comparison::Lt, Operand::Instant(end)),
        ]);
        assert!(within.matches(&doc));
    }

    #[test]
    fn test_array_any_element_semantics() {
        let doc = make_doc(json!(["u1", "u2"]));
        assert!(Predicate::eq(PATH, Operand::Text("u2".into())).matches(&doc));
        assert!(!Predicate::compare(PATH, Comparison::Ne, Operand::Text("u2".into())).matches(&doc));
        assert!(Predicate::is_in(PATH, vec!["u3".into(), "u1".into()]).matches(&doc));
        assert!(!Predicate::is_in(PATH, vec!["u3".into()]).matches(&doc));
    }

    #[test]
    fn test_list_operand_is_exact_array_equality() {
        let doc = make_doc(json!(["a", "b"]));
        assert!(Predicate::eq(PATH, Operand::List(vec!["a".into(), "b".into()])).matches(&doc));
        assert!(!Predicate::eq(PATH, Operand::List(vec!["a".into()])).matches(&doc));
    }

    #[test]
    fn test_contains() {
        let doc = make_doc(json!("hello world"));
        let pred = Predicate::Contains {
            path: PATH.into(),
            needle: "lo w".into(),
        };
        assert!(pred.matches(&doc));
    }

    #[test]
    fn test_non_empty() {
        let present = Predicate::NonEmpty {
            path: PATH.into(),
            present: true,
        };
        let absent = Predicate::NonEmpty {
            path: PATH.into(),
            present: false,
        };
        let with_file = make_doc(json!([{"url": "u", "name": "n"}]));
        let empty = make_doc(json!([]));

        assert!(present.matches(&with_file));
        assert!(!present.matches(&empty));
        assert!(absent.matches(&empty));
        assert!(absent.matches(&json!({})));
    }

    #[test]
    fn test_and_or_flattening() {
        assert_eq!(Predicate::and(vec![]), Predicate::All);
        assert_eq!(Predicate::or(vec![]), Predicate::All);
        let single = Predicate::eq(PATH, Operand::Bool(true));
        assert_eq!(Predicate::and(vec![Predicate::All, single.clone()]), single);
    }

    #[test]
    fn test_paths_first_seen_order() {
        let pred = Predicate::and(vec![
            Predicate::is_in("owners", vec!["g1".into()]),
            Predicate::or(vec![
                Predicate::eq("items.b.value", Operand::Text("x".into())),
                Predicate::eq("items.a.value", Operand::Text("y".into())),
                Predicate::eq("items.b.value", Operand::Text("z".into())),
            ]),
        ]);
        assert_eq!(pred.paths(), vec!["owners", "items.b.value", "items.a.value"]);
        assert_eq!(pred.equality_paths(), vec!["owners"]);
    }
}
