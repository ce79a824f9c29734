//! Function field formulas
//!
//! A formula is JSON in aggregation-expression form:
//!
//! - `"$items.qty.value"` reads a document path
//! - `{"$op": args}` applies an operator
//! - anything else is a literal (objects and arrays are evaluated element-wise)
//!
//! Missing paths evaluate to null. Arithmetic and string operators return
//! null when any operand is null.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::document::get_path;
use crate::store::compare_values;

/// Formula failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("Formula is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Unknown formula operator: {0}")]
    UnknownOperator(String),

    #[error("{op} expects {expected} arguments, got {found}")]
    Arity {
        op: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("{op} cannot take {found}")]
    TypeMismatch { op: &'static str, found: String },

    #[error("Division by zero")]
    DivisionByZero,
}

type FormulaResult<T> = Result<T, FormulaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
    IfNull,
    ToString,
    Round,
    Abs,
    Cond,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Not,
    Max,
    Min,
    Literal,
}

impl Op {
    fn parse(name: &str) -> Option<Op> {
        Some(match name {
            "$add" => Op::Add,
            "$subtract" => Op::Subtract,
            "$multiply" => Op::Multiply,
            "$divide" => Op::Divide,
            "$concat" => Op::Concat,
            "$ifNull" => Op::IfNull,
            "$toString" => Op::ToString,
            "$round" => Op::Round,
            "$abs" => Op::Abs,
            "$cond" => Op::Cond,
            "$eq" => Op::Eq,
            "$ne" => Op::Ne,
            "$gt" => Op::Gt,
            "$gte" => Op::Gte,
            "$lt" => Op::Lt,
            "$lte" => Op::Lte,
            "$and" => Op::And,
            "$or" => Op::Or,
            "$not" => Op::Not,
            "$max" => Op::Max,
            "$min" => Op::Min,
            "$literal" => Op::Literal,
            _ => return None,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Op::Add => "$add",
            Op::Subtract => "$subtract",
            Op::Multiply => "$multiply",
            Op::Divide => "$divide",
            Op::Concat => "$concat",
            Op::IfNull => "$ifNull",
            Op::ToString => "$toString",
            Op::Round => "$round",
            Op::Abs => "$abs",
            Op::Cond => "$cond",
            Op::Eq => "$eq",
            Op::Ne => "$ne",
            Op::Gt => "$gt",
            Op::Gte => "$gte",
            Op::Lt => "$lt",
            Op::Lte => "$lte",
            Op::And => "$and",
            Op::Or => "$or",
            Op::Not => "$not",
            Op::Max => "$max",
            Op::Min => "$min",
            Op::Literal => "$literal",
        }
    }

    /// Minimum and maximum argument count, and how the error reports it
    fn arity(&self) -> (usize, Option<usize>, &'static str) {
        match self {
            Op::Subtract | Op::Divide | Op::IfNull => (2, Some(2), "2"),
            Op::Eq | Op::Ne | Op::Gt | Op::Gte | Op::Lt | Op::Lte => (2, Some(2), "2"),
            Op::Cond => (3, Some(3), "3"),
            Op::Round => (1, Some(2), "1 or 2"),
            Op::ToString | Op::Abs | Op::Not => (1, Some(1), "1"),
            Op::Add | Op::Multiply | Op::Concat | Op::And | Op::Or | Op::Max | Op::Min => {
                (0, None, "any number of")
            }
            Op::Literal => (0, None, "a literal"),
        }
    }
}

/// A parsed, validated formula
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Value,
}

impl Formula {
    /// Parses formula text. An empty text is the null formula.
    pub fn parse(text: &str) -> FormulaResult<Self> {
        if text.trim().is_empty() {
            return Ok(Formula { expr: Value::Null });
        }
        let expr: Value =
            serde_json::from_str(text).map_err(|e| FormulaError::InvalidJson(e.to_string()))?;
        Self::from_value(expr)
    }

    pub fn from_value(expr: Value) -> FormulaResult<Self> {
        validate(&expr)?;
        Ok(Formula { expr })
    }

    pub fn evaluate(&self, document: &Value) -> FormulaResult<Value> {
        eval(&self.expr, document)
    }
}

fn operator_of(map: &Map<String, Value>) -> Option<(&str, &Value)> {
    if map.len() != 1 {
        return None;
    }
    map.iter()
        .next()
        .filter(|(key, _)| key.starts_with('$'))
        .map(|(key, args)| (key.as_str(), args))
}

/// Normalized argument list: a non-array argument is a single argument.
fn arguments(args: &Value) -> Vec<&Value> {
    match args {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn cond_arguments(args: &Value) -> Vec<&Value> {
    match args {
        Value::Object(map) if map.contains_key("if") => ["if", "then", "else"]
            .iter()
            .filter_map(|k| map.get(*k))
            .collect(),
        other => arguments(other),
    }
}

fn op_arguments(op: Op, args: &Value) -> FormulaResult<Vec<&Value>> {
    let list = match op {
        Op::Cond => cond_arguments(args),
        _ => arguments(args),
    };
    let (min, max, expected) = op.arity();
    if list.len() < min || max.map_or(false, |max| list.len() > max) {
        return Err(FormulaError::Arity {
            op: op.name(),
            expected,
            found: list.len(),
        });
    }
    Ok(list)
}

fn validate(expr: &Value) -> FormulaResult<()> {
    match expr {
        Value::Object(map) => match operator_of(map) {
            Some((name, args)) => {
                let op = Op::parse(name)
                    .ok_or_else(|| FormulaError::UnknownOperator(name.to_string()))?;
                if op == Op::Literal {
                    return Ok(());
                }
                for arg in op_arguments(op, args)? {
                    validate(arg)?;
                }
                Ok(())
            }
            None => map.values().try_for_each(validate),
        },
        Value::Array(items) => items.iter().try_for_each(validate),
        _ => Ok(()),
    }
}

fn eval(expr: &Value, doc: &Value) -> FormulaResult<Value> {
    match expr {
        Value::String(text) => match text.strip_prefix('$') {
            Some(path) => Ok(get_path(doc, path).cloned().unwrap_or(Value::Null)),
            None => Ok(expr.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| eval(item, doc))
            .collect::<FormulaResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => match operator_of(map) {
            Some((name, args)) => {
                let op = Op::parse(name)
                    .ok_or_else(|| FormulaError::UnknownOperator(name.to_string()))?;
                apply(op, args, doc)
            }
            None => map
                .iter()
                .map(|(key, value)| Ok((key.clone(), eval(value, doc)?)))
                .collect::<FormulaResult<Map<_, _>>>()
                .map(Value::Object),
        },
        _ => Ok(expr.clone()),
    }
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn numeric(op: Op, value: &Value) -> FormulaResult<f64> {
    value.as_f64().ok_or_else(|| FormulaError::TypeMismatch {
        op: op.name(),
        found: value.to_string(),
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        _ => true,
    }
}

/// Evaluated numeric operands, or `None` if any is null.
fn numbers(op: Op, values: &[Value]) -> FormulaResult<Option<Vec<f64>>> {
    if values.iter().any(Value::is_null) {
        return Ok(None);
    }
    values.iter().map(|v| numeric(op, v)).collect::<FormulaResult<_>>().map(Some)
}

fn apply(op: Op, args: &Value, doc: &Value) -> FormulaResult<Value> {
    if op == Op::Literal {
        return Ok(args.clone());
    }
    let raw = op_arguments(op, args)?;

    match op {
        Op::Cond => {
            let branch = if truthy(&eval(raw[0], doc)?) { raw[1] } else { raw[2] };
            return eval(branch, doc);
        }
        Op::IfNull => {
            let first = eval(raw[0], doc)?;
            return if first.is_null() { eval(raw[1], doc) } else { Ok(first) };
        }
        _ => {}
    }

    let values = raw
        .into_iter()
        .map(|arg| eval(arg, doc))
        .collect::<FormulaResult<Vec<_>>>()?;

    match op {
        Op::Add => Ok(numbers(op, &values)?.map_or(Value::Null, |n| number(n.iter().sum()))),
        Op::Multiply => {
            Ok(numbers(op, &values)?.map_or(Value::Null, |n| number(n.iter().product())))
        }
        Op::Subtract => Ok(numbers(op, &values)?.map_or(Value::Null, |n| number(n[0] - n[1]))),
        Op::Divide => match numbers(op, &values)? {
            None => Ok(Value::Null),
            Some(n) if n[1] == 0.0 => Err(FormulaError::DivisionByZero),
            Some(n) => Ok(number(n[0] / n[1])),
        },
        Op::Abs => Ok(numbers(op, &values)?.map_or(Value::Null, |n| number(n[0].abs()))),
        Op::Round => match numbers(op, &values)? {
            None => Ok(Value::Null),
            Some(n) => {
                let places = n.get(1).copied().unwrap_or(0.0) as i32;
                let scale = 10f64.powi(places);
                Ok(number((n[0] * scale).round() / scale))
            }
        },
        Op::Concat => {
            if values.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            let mut out = String::new();
            for value in &values {
                match value {
                    Value::String(text) => out.push_str(text),
                    other => {
                        return Err(FormulaError::TypeMismatch {
                            op: op.name(),
                            found: other.to_string(),
                        })
                    }
                }
            }
            Ok(Value::String(out))
        }
        Op::ToString => Ok(match &values[0] {
            Value::Null => Value::Null,
            Value::String(text) => Value::String(text.clone()),
            Value::Number(n) => Value::String(match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
                _ => n.to_string(),
            }),
            Value::Bool(b) => Value::String(b.to_string()),
            other => {
                return Err(FormulaError::TypeMismatch {
                    op: op.name(),
                    found: other.to_string(),
                })
            }
        }),
        Op::Eq | Op::Ne | Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
            let ordering = compare_values(Some(&values[0]), Some(&values[1]));
            let result = match op {
                Op::Eq => ordering == Ordering::Equal,
                Op::Ne => ordering != Ordering::Equal,
                Op::Gt => ordering == Ordering::Greater,
                Op::Gte => ordering != Ordering::Less,
                Op::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            };
            Ok(Value::Bool(result))
        }
        Op::And => Ok(Value::Bool(values.iter().all(truthy))),
        Op::Or => Ok(Value::Bool(values.iter().any(truthy))),
        Op::Not => Ok(Value::Bool(!truthy(&values[0]))),
        Op::Max | Op::Min => {
            // a single array argument is the candidate list
            let candidates: Vec<&Value> = match values.as_slice() {
                [Value::Array(items)] => items.iter().collect(),
                _ => values.iter().collect(),
            };
            let wanted = if op == Op::Max { Ordering::Greater } else { Ordering::Less };
            let best = candidates
                .into_iter()
                .filter(|v| !v.is_null())
                .fold(None::<&Value>, |best, v| match best {
                    Some(b) if compare_values(Some(v), Some(b)) != wanted => Some(b),
                    _ => Some(v),
                });
            Ok(best.cloned().unwrap_or(Value::Null))
        }
        Op::Cond | Op::IfNull | Op::Literal => Ok(Value::Null),
    }
}
