//! Filter conditions and their compiled predicates
//!
//! - `ast`: conditions as authored on a report or query
//! - `compiler`: conditions + combinator -> predicate tree
//! - `predicate`: the predicate tree and document matching
//! - `dates`: calendar interval expansion for date operands

mod ast;
mod compiler;
mod dates;
mod errors;
mod predicate;

pub use ast::{Combinator, FilterCondition, Operator, RANGE_CONDITION_TYPE, RANGE_SEPARATOR};
pub use compiler::{
    CompileContext, CompileTarget, CompiledFilter, ConditionCompiler, Strictness, OWNERS_PATH,
};
pub use dates::{DateInterval, NOW_SENTINEL, PERIOD_SENTINEL};
pub use errors::{CompileError, CompileResult};
pub use predicate::{Comparison, Operand, Predicate};
