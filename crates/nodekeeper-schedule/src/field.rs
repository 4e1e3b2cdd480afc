//! A single schedule field and its value domain.

use tracing::warn;

/// Inclusive value range of a schedule field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    pub name: &'static str,
    pub min: u32,
    pub max: u32,
}

impl Domain {
    pub const MINUTE: Domain = Domain { name: "minute", min: 0, max: 59 };
    pub const HOUR: Domain = Domain { name: "hour", min: 0, max: 23 };
    pub const DAY_OF_MONTH: Domain = Domain { name: "day-of-month", min: 1, max: 31 };
    pub const MONTH: Domain = Domain { name: "month", min: 1, max: 12 };
    pub const DAY_OF_WEEK: Domain = Domain { name: "day-of-week", min: 0, max: 6 };
}

/// One parsed schedule field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Any,
    Single(u32),
    List(Vec<u32>),
    /// Inclusive range; empty when `start > end`.
    Range(u32, u32),
    /// `start`, `start + interval`, ... up to the domain maximum.
    Step { start: u32, interval: u32 },
    /// A field whose operands did not parse. Never matches.
    Unmatchable(String),
}

impl Field {
    /// Parse one field. Prefix rules apply in order: `*`, `/`, `-`, `,`.
    pub fn parse(raw: &str, domain: Domain) -> Field {
        let field = if raw == "*" {
            Some(Field::Any)
        } else if let Some((start, interval)) = raw.split_once('/') {
            let start = if start == "*" {
                Some(domain.min)
            } else {
                number(start)
            };
            match (start, number(interval)) {
                (Some(start), Some(interval)) if interval > 0 => Some(Field::Step { start, interval }),
                _ => None,
            }
        } else if let Some((start, end)) = raw.split_once('-') {
            match (number(start), number(end)) {
                (Some(start), Some(end)) => Some(Field::Range(start, end)),
                _ => None,
            }
        } else if raw.contains(',') {
            raw.split(',')
                .map(number)
                .collect::<Option<Vec<_>>>()
                .map(Field::List)
        } else {
            number(raw).map(Field::Single)
        };

        field.unwrap_or_else(|| {
            warn!(field = domain.name, value = %raw, "unparsable schedule field, it will never match");
            Field::Unmatchable(raw.to_string())
        })
    }

    /// True when `value` is in this field's set.
    pub fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Single(v) => *v == value,
            Field::List(values) => values.contains(&value),
            Field::Range(start, end) => (*start..=*end).contains(&value),
            Field::Step { start, interval } => value >= *start && (value - start) % interval == 0,
            Field::Unmatchable(_) => false,
        }
    }

    /// Materialise the set of values this field accepts within `domain`.
    pub fn values(&self, domain: Domain) -> Vec<u32> {
        match self {
            Field::Any => (domain.min..=domain.max).collect(),
            Field::Single(v) => vec![*v],
            Field::List(values) => values.clone(),
            Field::Range(start, end) => (*start..=*end).collect(),
            Field::Step { start, interval } => (*start..=domain.max)
                .step_by(*interval as usize)
                .collect(),
            Field::Unmatchable(_) => Vec::new(),
        }
    }
}

fn number(s: &str) -> Option<u32> {
    s.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_precedence() {
        let d = Domain::MINUTE;
        assert_eq!(Field::parse("*", d), Field::Any);
        assert_eq!(Field::parse("*/15", d), Field::Step { start: 0, interval: 15 });
        assert_eq!(Field::parse("5/10", d), Field::Step { start: 5, interval: 10 });
        assert_eq!(Field::parse("10-20", d), Field::Range(10, 20));
        assert_eq!(Field::parse("1,2,3", d), Field::List(vec![1, 2, 3]));
        assert_eq!(Field::parse("7", d), Field::Single(7));
    }

    #[test]
    fn step_from_star_starts_at_domain_minimum() {
        assert_eq!(
            Field::parse("*/2", Domain::DAY_OF_MONTH),
            Field::Step { start: 1, interval: 2 }
        );
        let f = Field::parse("*/2", Domain::DAY_OF_MONTH);
        assert!(f.matches(1));
        assert!(f.matches(31));
        assert!(!f.matches(2));
    }

    #[test]
    fn non_numeric_operands_are_unmatchable() {
        for raw in ["x", "1-y", "a/5", "*/z", "1,two,3", "", "-5"] {
            let f = Field::parse(raw, Domain::HOUR);
            assert!(matches!(f, Field::Unmatchable(_)), "{raw:?} parsed as {f:?}");
            assert!((0..=23).all(|h| !f.matches(h)));
        }
    }

    #[test]
    fn zero_step_is_unmatchable() {
        assert!(matches!(Field::parse("*/0", Domain::MINUTE), Field::Unmatchable(_)));
    }

    #[test]
    fn reversed_range_matches_nothing() {
        let f = Field::parse("20-10", Domain::MINUTE);
        assert_eq!(f, Field::Range(20, 10));
        assert!((0..=59).all(|m| !f.matches(m)));
        assert!(f.values(Domain::MINUTE).is_empty());
    }

    #[test]
    fn matches_agrees_with_materialised_values() {
        let cases = [
            ("*", Domain::MINUTE),
            ("*/7", Domain::MINUTE),
            ("3/20", Domain::MINUTE),
            ("9-17", Domain::HOUR),
            ("1,15,31", Domain::DAY_OF_MONTH),
            ("6", Domain::MONTH),
            ("1-5", Domain::DAY_OF_WEEK),
            ("oops", Domain::DAY_OF_WEEK),
        ];
        for (raw, domain) in cases {
            let field = Field::parse(raw, domain);
            let values = field.values(domain);
            for v in domain.min..=domain.max {
                assert_eq!(field.matches(v), values.contains(&v), "{raw} at {v}");
            }
        }
    }
}
