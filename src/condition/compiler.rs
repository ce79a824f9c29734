//! Condition compiler
//!
//! Turns an ordered list of user-authored conditions plus an AND/OR
//! combinator into a single predicate tree.
//!
//! # Field paths
//!
//! - static columns are addressed by name (`check_status`, `created_at`)
//! - dynamic fields live at `items.<field>.value`
//! - relation fields (`rel#field`) live at `relations.<rel>.<field>.value`
//!   while compiling against source records, and at
//!   `items.rel#field.value` in materialized output
//!
//! # Strictness
//!
//! Lenient compilation drops conditions it cannot interpret (logged at WARN
//! and counted in `CompiledFilter::skipped`) and treats an operator the field
//! type does not support as equality. Strict compilation rejects both.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::ast::{Combinator, FilterCondition, Operator, RANGE_SEPARATOR};
use super::dates::{epoch_day, DateInterval, NOW_SENTINEL, PERIOD_SENTINEL};
use super::errors::{CompileError, CompileResult};
use super::predicate::{Comparison, Operand, Predicate};
use crate::observability::Event;
use crate::value::{parse_instant, DataType};

/// Path of the owners ACL column
pub const OWNERS_PATH: &str = "owners";

/// How uninterpretable conditions are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    #[default]
    Lenient,
    Strict,
}

/// Which document shape the predicate will be evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileTarget {
    /// Source item records, after relation joins
    Source,
    /// Rows of a materialized report collection
    Materialized,
}

/// Inputs that are not part of the conditions themselves
#[derive(Debug, Clone)]
pub struct CompileContext {
    /// Tenant processing period, `YYYY-MM`
    pub processing_period: Option<String>,
    /// Instant that `now` resolves against
    pub now: DateTime<Utc>,
    pub strictness: Strictness,
    pub target: CompileTarget,
}

impl CompileContext {
    pub fn new(target: CompileTarget, now: DateTime<Utc>) -> Self {
        Self {
            processing_period: None,
            now,
            strictness: Strictness::Lenient,
            target,
        }
    }

    pub fn with_period(mut self, period: Option<String>) -> Self {
        self.processing_period = period;
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }
}

/// Output of compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub predicate: Predicate,
    /// Paths worth indexing, in priority order
    pub index_keys: Vec<String>,
    /// Some condition references a relation field
    pub touches_relations: bool,
    /// Conditions dropped by lenient compilation
    pub skipped: usize,
}

/// Compiles filter conditions into predicates
#[derive(Debug, Clone)]
pub struct ConditionCompiler {
    ctx: CompileContext,
}

impl ConditionCompiler {
    pub fn new(ctx: CompileContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &CompileContext {
        &self.ctx
    }

    /// Compiles stored report conditions.
    pub fn compile(
        &self,
        conditions: &[FilterCondition],
        combinator: &str,
    ) -> CompileResult<CompiledFilter> {
        let combinator = self.combinator(combinator)?;

        let mut parts = Vec::with_capacity(conditions.len());
        let mut skipped = 0;
        for condition in conditions {
            match self.compile_one(condition) {
                Ok(Some(predicate)) => parts.push(predicate),
                Ok(None) => {}
                Err(err) if self.ctx.strictness == Strictness::Lenient => {
                    warn!(
                        event = %Event::ConditionSkipped,
                        field_id = %condition.field_id,
                        field_type = %condition.field_type,
                        operator = %condition.operator,
                        reason = %err,
                        "condition dropped"
                    );
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        let predicate = match combinator {
            Combinator::And => Predicate::and(parts),
            Combinator::Or => Predicate::or(parts),
        };

        Ok(CompiledFilter {
            index_keys: predicate.paths(),
            touches_relations: conditions.iter().any(|c| c.relation_ref().is_some()),
            predicate,
            skipped,
        })
    }

    /// Compiles ad-hoc query conditions, restricted to rows visible to `owners`.
    ///
    /// `owners` is always the first index key.
    pub fn compile_adhoc(
        &self,
        conditions: &[FilterCondition],
        combinator: &str,
        owners: &[String],
    ) -> CompileResult<CompiledFilter> {
        let compiled = self.compile(conditions, combinator)?;

        let acl = Predicate::is_in(OWNERS_PATH, owners.to_vec());
        let predicate = Predicate::and(vec![acl, compiled.predicate]);

        let mut index_keys = vec![OWNERS_PATH.to_string()];
        for key in compiled.index_keys {
            if !index_keys.contains(&key) {
                index_keys.push(key);
            }
        }

        Ok(CompiledFilter {
            predicate,
            index_keys,
            ..compiled
        })
    }

    fn combinator(&self, text: &str) -> CompileResult<Combinator> {
        match self.ctx.strictness {
            Strictness::Lenient => Ok(Combinator::parse_lenient(text)),
            Strictness::Strict => Combinator::parse_strict(text)
                .ok_or_else(|| CompileError::UnknownCombinator(text.to_string())),
        }
    }

    fn path_of(&self, condition: &FilterCondition) -> String {
        if !condition.is_dynamic {
            return condition.field_id.clone();
        }
        match (condition.relation_ref(), self.ctx.target) {
            (Some((relation, field)), CompileTarget::Source) => {
                format!("relations.{}.{}.value", relation, field)
            }
            _ => format!("items.{}.value", condition.field_id),
        }
    }

    /// `Ok(None)` means the condition contributes no predicate.
    fn compile_one(&self, condition: &FilterCondition) -> CompileResult<Option<Predicate>> {
        let path = self.path_of(condition);
        let raw = condition.search_value.as_str();

        if condition.is_dynamic {
            self.compile_dynamic(condition, path, raw)
        } else {
            self.compile_static(condition, path, raw)
        }
    }

    fn compile_dynamic(
        &self,
        condition: &FilterCondition,
        path: String,
        raw: &str,
    ) -> CompileResult<Option<Predicate>> {
        use Operator::*;

        let predicate = match condition.field_type {
            DataType::Text | DataType::Textarea | DataType::Autonum | DataType::Lookup => {
                match self.operator(condition, &[Eq, Ne, Like])? {
                    Like => Predicate::Contains {
                        path,
                        needle: raw.to_string(),
                    },
                    Ne => Predicate::compare(path, Comparison::Ne, Operand::Text(raw.into())),
                    _ => Predicate::eq(path, Operand::Text(raw.into())),
                }
            }
            DataType::Switch => {
                self.operator(condition, &[Eq])?;
                let flag = raw
                    .trim()
                    .parse::<bool>()
                    .map_err(|_| invalid_value(condition))?;
                Predicate::eq(path, Operand::Bool(flag))
            }
            DataType::File => Predicate::NonEmpty {
                path,
                present: raw.trim() == "true",
            },
            DataType::Options | DataType::User => self.membership(condition, path, raw, false)?,
            DataType::Number => self.ordered(condition, path, raw, |text| {
                text.parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(Operand::Number)
            })?,
            DataType::Time => {
                self.ordered(condition, path, raw, |text| Some(Operand::Text(text.into())))?
            }
            DataType::Date | DataType::Datetime => return self.dated(condition, &path, raw),
            _ => return Err(unsupported_type(condition)),
        };

        Ok(Some(predicate))
    }

    fn compile_static(
        &self,
        condition: &FilterCondition,
        path: String,
        raw: &str,
    ) -> CompileResult<Option<Predicate>> {
        let predicate = match condition.field_type {
            DataType::Options | DataType::Type | DataType::User => {
                self.membership(condition, path, raw, true)?
            }
            DataType::Check => {
                self.operator(condition, &[Operator::Eq])?;
                Predicate::eq(path, Operand::Text(raw.into()))
            }
            DataType::Datetime | DataType::Date => return self.dated(condition, &path, raw),
            _ => return Err(unsupported_type(condition)),
        };

        Ok(Some(predicate))
    }

    /// Membership, not-equal or equality on enumerated values.
    ///
    /// Static multi-value columns compare equality against the whole list.
    fn membership(
        &self,
        condition: &FilterCondition,
        path: String,
        raw: &str,
        list_equality: bool,
    ) -> CompileResult<Predicate> {
        let op = self.operator(condition, &[Operator::Eq, Operator::Ne, Operator::In])?;
        let predicate = match op {
            Operator::In => Predicate::is_in(path, split_values(raw)),
            Operator::Ne => Predicate::compare(path, Comparison::Ne, Operand::Text(raw.into())),
            _ if list_equality => Predicate::eq(path, Operand::List(split_values(raw))),
            _ => Predicate::eq(path, Operand::Text(raw.into())),
        };
        Ok(predicate)
    }

    /// Range, relational and equality comparisons on an ordered type.
    fn ordered(
        &self,
        condition: &FilterCondition,
        path: String,
        raw: &str,
        parse: impl Fn(&str) -> Option<Operand>,
    ) -> CompileResult<Predicate> {
        use Operator::*;

        let op = self.operator(condition, &[Eq, Ne, Gt, Gte, Lt, Lte, Range])?;
        if op == Range {
            let (low, high) = split_range(raw).ok_or_else(|| invalid_value(condition))?;
            let low = parse(low).ok_or_else(|| invalid_value(condition))?;
            let high = parse(high).ok_or_else(|| invalid_value(condition))?;
            return Ok(Predicate::and(vec![
                Predicate::compare(path.clone(), Comparison::Gte, low),
                Predicate::compare(path, Comparison::Lt, high),
            ]));
        }

        let operand = parse(raw.trim()).ok_or_else(|| invalid_value(condition))?;
        Ok(Predicate::compare(path, comparison_of(op), operand))
    }

    /// Date conditions, expanded to calendar intervals.
    fn dated(
        &self,
        condition: &FilterCondition,
        path: &str,
        raw: &str,
    ) -> CompileResult<Option<Predicate>> {
        use Operator::*;

        let op = self.operator(condition, &[Eq, Ne, Gt, Gte, Lt, Lte, Range])?;
        if op == Range {
            let (low, high) = split_range(raw).ok_or_else(|| invalid_value(condition))?;
            let start_of = |text: &str| {
                parse_instant(text).and_then(|t| DateInterval::day(t.date_naive()))
            };
            let low = start_of(low).ok_or_else(|| invalid_value(condition))?;
            let high = start_of(high).ok_or_else(|| invalid_value(condition))?;
            return Ok(Some(Predicate::and(vec![
                Predicate::compare(path, Comparison::Gte, Operand::Instant(low.start)),
                Predicate::compare(path, Comparison::Lt, Operand::Instant(high.start)),
            ])));
        }

        let interval = match raw.trim() {
            NOW_SENTINEL => DateInterval::day(self.ctx.now.date_naive()),
            PERIOD_SENTINEL => {
                let period = self.ctx.processing_period.as_deref();
                match period.and_then(DateInterval::month) {
                    Some(interval) => Some(interval),
                    None => {
                        debug!(
                            field_id = %condition.field_id,
                            period = ?period,
                            "no usable processing period, condition ignored"
                        );
                        return Ok(None);
                    }
                }
            }
            "" => epoch_day().and_then(DateInterval::day),
            text => parse_instant(text).and_then(|t| DateInterval::day(t.date_naive())),
        };

        let interval = interval.ok_or_else(|| invalid_value(condition))?;
        Ok(interval.predicate(path, op))
    }

    /// Resolves the operator, falling back to equality under lenient compilation.
    fn operator(
        &self,
        condition: &FilterCondition,
        allowed: &[Operator],
    ) -> CompileResult<Operator> {
        match condition.operator() {
            Some(op) if allowed.contains(&op) => Ok(op),
            _ if self.ctx.strictness == Strictness::Strict => {
                Err(CompileError::UnsupportedOperator {
                    field_id: condition.field_id.clone(),
                    field_type: condition.field_type,
                    operator: condition.operator.clone(),
                })
            }
            _ => Ok(Operator::Eq),
        }
    }
}

fn comparison_of(op: Operator) -> Comparison {
    match op {
        Operator::Ne => Comparison::Ne,
        Operator::Gt => Comparison::Gt,
        Operator::Gte => Comparison::Gte,
        Operator::Lt => Comparison::Lt,
        Operator::Lte => Comparison::Lte,
        _ => Comparison::Eq,
    }
}

fn split_range(raw: &str) -> Option<(&str, &str)> {
    let (low, high) = raw.split_once(RANGE_SEPARATOR)?;
    Some((low.trim(), high.trim()))
}

fn split_values(raw: &str) -> Vec<String> {
    raw.split(',').map(|v| v.trim().to_string()).collect()
}

fn invalid_value(condition: &FilterCondition) -> CompileError {
    CompileError::InvalidValue {
        field_id: condition.field_id.clone(),
        field_type: condition.field_type,
        value: condition.search_value.clone(),
    }
}

fn unsupported_type(condition: &FilterCondition) -> CompileError {
    CompileError::UnsupportedFieldType {
        field_id: condition.field_id.clone(),
        field_type: condition.field_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ctx() -> CompileContext {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 13, 30, 0).unwrap();
        CompileContext::new(CompileTarget::Source, now)
    }

    fn compile(conditions: &[FilterCondition], combinator: &str) -> CompiledFilter {
        ConditionCompiler::new(ctx()).compile(conditions, combinator).unwrap()
    }

    fn number_doc(n: f64) -> serde_json::Value {
        json!({"items": {"amount": {"data_type": "number", "value": n}}})
    }

    fn date_doc(text: &str) -> serde_json::Value {
        json!({"items": {"due": {"data_type": "date", "value": text}}})
    }

    #[test]
    fn test_numeric_range_is_half_open() {
        let cond = FilterCondition::dynamic("amount", DataType::Number, "", "10~20").as_range();
        let filter = compile(&[cond], "and");

        assert!(!filter.predicate.matches(&number_doc(9.99)));
        assert!(filter.predicate.matches(&number_doc(10.0)));
        assert!(filter.predicate.matches(&number_doc(19.99)));
        assert!(!filter.predicate.matches(&number_doc(20.0)));
    }

    #[test]
    fn test_now_lte_covers_whole_current_day() {
        let cond = FilterCondition::dynamic("due", DataType::Date, "<=", "now");
        let filter = compile(&[cond], "and");

        assert!(filter.predicate.matches(&date_doc("2024-06-15T23:59:59.000Z")));
        assert!(filter.predicate.matches(&date_doc("2024-01-01T00:00:00.000Z")));
        assert!(!filter.predicate.matches(&date_doc("2024-06-16T00:00:00.000Z")));
    }

    #[test]
    fn test_plain_date_gt_starts_next_day() {
        let cond = FilterCondition::dynamic("due", DataType::Date, ">", "2024-03-01");
        let filter = compile(&[cond], "and");

        assert!(!filter.predicate.matches(&date_doc("2024-03-01T18:00:00.000Z")));
        assert!(filter.predicate.matches(&date_doc("2024-03-02T00:00:00.000Z")));
    }

    #[test]
    fn test_period_sentinel_uses_processing_period() {
        let cond = FilterCondition::dynamic("due", DataType::Date, "=", "handleMonth");
        let ctx = ctx().with_period(Some("2024-02".into()));
        let filter = ConditionCompiler::new(ctx).compile(&[cond], "and").unwrap();

        assert!(filter.predicate.matches(&date_doc("2024-02-29T10:00:00.000Z")));
        assert!(!filter.predicate.matches(&date_doc("2024-03-01T00:00:00.000Z")));
    }

    #[test]
    fn test_period_sentinel_without_period_is_no_predicate() {
        let cond = FilterCondition::dynamic("due", DataType::Date, "=", "handleMonth");
        let filter = compile(&[cond], "and");
        assert_eq!(filter.predicate, Predicate::All);
        assert_eq!(filter.skipped, 0);
    }

    #[test]
    fn test_and_vs_or() {
        let low = FilterCondition::dynamic("amount", DataType::Number, "<", "5");
        let high = FilterCondition::dynamic("amount", DataType::Number, ">", "50");

        let and = compile(&[low.clone(), high.clone()], "and");
        let or = compile(&[low, high], "or");

        for n in [1.0, 60.0] {
            assert!(!and.predicate.matches(&number_doc(n)));
            assert!(or.predicate.matches(&number_doc(n)));
        }
        assert!(!or.predicate.matches(&number_doc(10.0)));
    }

    #[test]
    fn test_lenient_skips_unknown_field_type() {
        let cond = FilterCondition::dynamic("calc", DataType::Function, "=", "1");
        let filter = compile(&[cond], "and");
        assert_eq!(filter.predicate, Predicate::All);
        assert_eq!(filter.skipped, 1);
    }

    #[test]
    fn test_strict_rejects_unknown_field_type() {
        let cond = FilterCondition::dynamic("calc", DataType::Function, "=", "1");
        let compiler = ConditionCompiler::new(ctx().with_strictness(Strictness::Strict));
        let err = compiler.compile(&[cond], "and").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedFieldType { .. }));
    }

    #[test]
    fn test_lenient_unsupported_operator_falls_back_to_equality() {
        let cond = FilterCondition::dynamic("flag", DataType::Switch, ">", "true");
        let filter = compile(&[cond.clone()], "and");
        assert_eq!(
            filter.predicate,
            Predicate::eq("items.flag.value", Operand::Bool(true))
        );

        let strict = ConditionCompiler::new(ctx().with_strictness(Strictness::Strict));
        assert!(matches!(
            strict.compile(&[cond], "and").unwrap_err(),
            CompileError::UnsupportedOperator { .. }
        ));
    }

    #[test]
    fn test_strict_rejects_unknown_combinator() {
        let compiler = ConditionCompiler::new(ctx().with_strictness(Strictness::Strict));
        assert_eq!(
            compiler.compile(&[], "xor").unwrap_err(),
            CompileError::UnknownCombinator("xor".into())
        );
    }

    #[test]
    fn test_relation_paths_per_target() {
        let cond = FilterCondition::dynamic("r1#name", DataType::Text, "=", "x");

        let source = compile(&[cond.clone()], "and");
        assert!(source.touches_relations);
        assert_eq!(source.index_keys, vec!["relations.r1.name.value"]);

        let ctx = CompileContext::new(CompileTarget::Materialized, Utc::now());
        let materialized = ConditionCompiler::new(ctx).compile(&[cond], "and").unwrap();
        assert_eq!(materialized.index_keys, vec!["items.r1#name.value"]);
    }

    #[test]
    fn test_adhoc_owners_first() {
        let cond = FilterCondition::dynamic("status", DataType::Options, "in", "a,b");
        let filter = ConditionCompiler::new(ctx())
            .compile_adhoc(&[cond], "and", &["g1".to_string()])
            .unwrap();

        assert_eq!(filter.index_keys, vec!["owners", "items.status.value"]);

        let visible = json!({"owners": ["g1"], "items": {"status": {"value": "b"}}});
        let hidden = json!({"owners": ["g2"], "items": {"status": {"value": "b"}}});
        assert!(filter.predicate.matches(&visible));
        assert!(!filter.predicate.matches(&hidden));
    }

    #[test]
    fn test_file_presence() {
        let cond = FilterCondition::dynamic("doc", DataType::File, "=", "true");
        let filter = compile(&[cond], "and");
        let with = json!({"items": {"doc": {"value": [{"url": "a", "name": "b"}]}}});
        let without = json!({"items": {"doc": {"value": []}}});
        assert!(filter.predicate.matches(&with));
        assert!(!filter.predicate.matches(&without));
    }

    #[test]
    fn test_static_type_list_equality() {
        let cond = FilterCondition::fixed("check_type", DataType::Type, "=", "a,b");
        let filter = compile(&[cond], "and");
        assert!(filter.predicate.matches(&json!({"check_type": ["a", "b"]})));
        assert!(!filter.predicate.matches(&json!({"check_type": ["a"]})));
    }

    #[test]
    fn test_invalid_number_skipped_leniently() {
        let cond = FilterCondition::dynamic("amount", DataType::Number, ">", "lots");
        let filter = compile(&[cond], "and");
        assert_eq!(filter.skipped, 1);
        assert_eq!(filter.predicate, Predicate::All);
    }
}
