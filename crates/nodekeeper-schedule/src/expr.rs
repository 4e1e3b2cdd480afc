//! Five-field schedule expressions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use tracing::debug;

use crate::error::ScheduleError;
use crate::field::{Domain, Field};

/// A parsed `start-schedule` / `stop-schedule` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleExpression {
    pub minute: Field,
    pub hour: Field,
    pub day_of_month: Field,
    pub month: Field,
    pub day_of_week: Field,
    source: String,
}

impl ScheduleExpression {
    /// Parse a whitespace-separated five-field expression.
    ///
    /// Only the field count is validated. Malformed operands inside a
    /// field produce `Field::Unmatchable`.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day_of_month, month, day_of_week] = parts[..] else {
            return Err(ScheduleError::FieldCount {
                expression: expression.to_string(),
                found: parts.len(),
            });
        };

        let schedule = Self {
            minute: Field::parse(minute, Domain::MINUTE),
            hour: Field::parse(hour, Domain::HOUR),
            day_of_month: Field::parse(day_of_month, Domain::DAY_OF_MONTH),
            month: Field::parse(month, Domain::MONTH),
            day_of_week: Field::parse(day_of_week, Domain::DAY_OF_WEEK),
            source: expression.to_string(),
        };
        debug!(expression, ?schedule, "parsed schedule");
        Ok(schedule)
    }

    /// True when every field accepts the corresponding component of `instant`.
    ///
    /// Components are read in the instant's own time zone; day-of-week
    /// counts from Sunday = 0.
    pub fn matches<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> bool {
        self.minute.matches(instant.minute())
            && self.hour.matches(instant.hour())
            && self.day_of_month.matches(instant.day())
            && self.month.matches(instant.month())
            && self.day_of_week.matches(instant.weekday().num_days_from_sunday())
    }

    /// Original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when any field can never match.
    pub fn has_unmatchable_field(&self) -> bool {
        [
            &self.minute,
            &self.hour,
            &self.day_of_month,
            &self.month,
            &self.day_of_week,
        ]
        .iter()
        .any(|f| matches!(f, Field::Unmatchable(_)))
    }
}

impl FromStr for ScheduleExpression {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
