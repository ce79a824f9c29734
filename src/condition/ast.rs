//! User-authored filter conditions
//!
//! Conditions are stored exactly as authored: operator and search value are
//! strings. Interpretation happens in the compiler.

use serde::{Deserialize, Serialize};

use crate::value::DataType;

/// Legacy marker: `condition_type == "1"` turns a condition into a range.
pub const RANGE_CONDITION_TYPE: &str = "1";

/// Separator between range bounds in a search value (`low~high`)
pub const RANGE_SEPARATOR: char = '~';

/// A single filter condition on a report or ad-hoc query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Static column name, dynamic field id, or `relation#field`
    pub field_id: String,
    pub field_type: DataType,
    #[serde(default)]
    pub search_value: String,
    #[serde(default)]
    pub operator: String,
    /// Dynamic item field (`items.<id>.value`) rather than a static column
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub condition_type: String,
}

impl FilterCondition {
    /// Dynamic field condition
    pub fn dynamic(
        field_id: impl Into<String>,
        field_type: DataType,
        operator: impl Into<String>,
        search_value: impl Into<String>,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            field_type,
            search_value: search_value.into(),
            operator: operator.into(),
            is_dynamic: true,
            condition_type: String::new(),
        }
    }

    /// Static column condition
    pub fn fixed(
        field_id: impl Into<String>,
        field_type: DataType,
        operator: impl Into<String>,
        search_value: impl Into<String>,
    ) -> Self {
        Self {
            is_dynamic: false,
            ..Self::dynamic(field_id, field_type, operator, search_value)
        }
    }

    /// Marks this condition as a `low~high` range.
    pub fn as_range(mut self) -> Self {
        self.condition_type = RANGE_CONDITION_TYPE.to_string();
        self
    }

    /// Resolved operator; `None` for an unrecognized operator string.
    pub fn operator(&self) -> Option<Operator> {
        if self.condition_type == RANGE_CONDITION_TYPE {
            return Some(Operator::Range);
        }
        Operator::parse(&self.operator)
    }

    /// `(relation_id, field_id)` for relation-qualified references
    pub fn relation_ref(&self) -> Option<(&str, &str)> {
        if !self.is_dynamic {
            return None;
        }
        self.field_id.split_once('#')
    }
}

/// Condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match
    Like,
    /// Membership in a comma-separated list
    In,
    /// Half-open `[low, high)` range
    Range,
}

impl Operator {
    pub fn parse(text: &str) -> Option<Operator> {
        match text.trim() {
            "" | "=" | "==" | "eq" => Some(Operator::Eq),
            "<>" | "!=" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            "like" => Some(Operator::Like),
            "in" => Some(Operator::In),
            "range" | "~" => Some(Operator::Range),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::Range => "range",
        }
    }
}

/// How condition predicates are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    /// `"and"` is conjunction; every other value is disjunction.
    pub fn parse_lenient(text: &str) -> Combinator {
        if text == "and" {
            Combinator::And
        } else {
            Combinator::Or
        }
    }

    /// Only `"and"`, `"or"` and the empty string are accepted.
    pub fn parse_strict(text: &str) -> Option<Combinator> {
        match text {
            "and" => Some(Combinator::And),
            "or" | "" => Some(Combinator::Or),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_range_flag_overrides_operator() {
        let cond = FilterCondition::dynamic("f1", DataType::Number, "=", "10~20").as_range();
        assert_eq!(cond.operator(), Some(Operator::Range));
    }

    #[test]
    fn test_empty_operator_is_equality() {
        let cond = FilterCondition::dynamic("f1", DataType::Text, "", "abc");
        assert_eq!(cond.operator(), Some(Operator::Eq));
    }

    #[test]
    fn test_unknown_operator() {
        assert_eq!(Operator::parse("between"), None);
    }

    #[test]
    fn test_relation_ref_only_for_dynamic() {
        let cond = FilterCondition::dynamic("r1#f2", DataType::Text, "=", "x");
        assert_eq!(cond.relation_ref(), Some(("r1", "f2")));

        let cond = FilterCondition::fixed("r1#f2", DataType::Check, "=", "x");
        assert_eq!(cond.relation_ref(), None);
    }

    #[test]
    fn test_combinators() {
        assert_eq!(Combinator::parse_lenient("and"), Combinator::And);
        assert_eq!(Combinator::parse_lenient("AND"), Combinator::Or);
        assert_eq!(Combinator::parse_lenient(""), Combinator::Or);
        assert_eq!(Combinator::parse_strict("xor"), None);
    }
}
