//! Controller error types.

use thiserror::Error;

pub type LimiterResult<T> = Result<T, LimiterError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("concurrency limit must be at least 1")]
    ZeroCapacity,

    #[error("concurrency limiter closed")]
    Closed,
}
