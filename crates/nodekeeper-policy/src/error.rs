//! Policy evaluation errors.

use nodekeeper_core::{ProviderError, TagError};
use thiserror::Error;

pub type PolicyResult<T> = Result<T, PolicyError>;

/// Why one resource's evaluation was abandoned.
///
/// A dependency cycle is not an error; it ends that branch of the cascade
/// and is only logged.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("dependency {reference} of {dependent} does not exist")]
    DependencyNotFound { reference: String, dependent: String },

    #[error("invalid tag: {0}")]
    Tag(#[from] TagError),
}
