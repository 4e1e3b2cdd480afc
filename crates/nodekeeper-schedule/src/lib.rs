//! nodekeeper-schedule — cron-like schedule matching.
//!
//! `start-schedule` and `stop-schedule` tags hold five space-separated
//! fields: minute, hour, day-of-month, month, day-of-week. Each field is
//! parsed independently:
//!
//! ```text
//! "*"      → Any
//! "a/n"    → Step    (a = "*" starts at the domain minimum)
//! "a-b"    → Range
//! "a,b,c"  → List
//! "a"      → Single
//! ```
//!
//! The controller is invoked periodically and asks one question per
//! resource: does *now* satisfy the schedule? There is no next-fire-time
//! computation. A field with non-numeric operands parses to
//! `Field::Unmatchable` instead of failing, so a typo in one tag silently
//! disables that schedule without affecting anything else.

pub mod error;
pub mod expr;
pub mod field;

pub use error::ScheduleError;
pub use expr::ScheduleExpression;
pub use field::{Domain, Field};
