//! Schedule parse errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 5 schedule fields, found {found} in {expression:?}")]
    FieldCount { expression: String, found: usize },
}
