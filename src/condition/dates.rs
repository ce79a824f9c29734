//! Calendar intervals for date conditions
//!
//! Every date operand denotes a half-open interval: a single day for plain
//! dates and `now`, a whole month for the processing period.

use chrono::{DateTime, Months, NaiveDate, Utc};

use super::ast::Operator;
use super::predicate::{Comparison, Operand, Predicate};

/// Sentinel for the current calendar day
pub const NOW_SENTINEL: &str = "now";

/// Sentinel for the tenant's processing-period month
pub const PERIOD_SENTINEL: &str = "handleMonth";

/// Half-open `[start, end)` interval of instants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateInterval {
    /// The calendar day containing `date`.
    pub fn day(date: NaiveDate) -> Option<Self> {
        let start = date.and_hms_opt(0, 0, 0)?.and_utc();
        let end = date.succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc();
        Some(Self { start, end })
    }

    /// The month named by a `YYYY-MM` processing period.
    pub fn month(period: &str) -> Option<Self> {
        let (year, month) = period.trim().split_once('-')?;
        let first = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)?;
        let next = first.checked_add_months(Months::new(1))?;
        Some(Self {
            start: first.and_hms_opt(0, 0, 0)?.and_utc(),
            end: next.and_hms_opt(0, 0, 0)?.and_utc(),
        })
    }

    /// Expands a relational operator against this interval.
    ///
    /// `None` for operators with no date meaning (`like`, `in`, `range`).
    pub fn predicate(&self, path: &str, operator: Operator) -> Option<Predicate> {
        let bound = |comparison, instant| {
            Predicate::compare(path, comparison, Operand::Instant(instant))
        };
        let predicate = match operator {
            Operator::Eq => Predicate::and(vec![
                bound(Comparison::Gte, self.start),
                bound(Comparison::Lt, self.end),
            ]),
            Operator::Ne => Predicate::or(vec![
                bound(Comparison::Lt, self.start),
                bound(Comparison::Gte, self.end),
            ]),
            Operator::Gt => bound(Comparison::Gte, self.end),
            Operator::Gte => bound(Comparison::Gte, self.start),
            Operator::Lt => bound(Comparison::Lt, self.start),
            Operator::Lte => bound(Comparison::Lt, self.end),
            Operator::Like | Operator::In | Operator::Range => return None,
        };
        Some(predicate)
    }
}

/// Earliest representable calendar day, used for an empty date operand.
pub fn epoch_day() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1, 1, 1)
}
