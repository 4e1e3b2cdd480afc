//! Error types shared across Nodekeeper crates.

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A failed call to an external collaborator.
///
/// Every provider call may fail independently. The error travels only as
/// far as the resource task that issued the call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{operation} failed for {target}: {message}")]
    Call {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        operation: &'static str,
        kind: String,
    },
}

impl ProviderError {
    pub fn call(operation: &'static str, target: impl Into<String>, message: impl ToString) -> Self {
        Self::Call {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// A tag value the controller cannot interpret.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("invalid duration in tag {key}: {value:?} (expected <int>m or <int>h)")]
    InvalidDuration { key: String, value: String },
}

/// Errors loading `nodekeeper.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {name}: {value:?}")]
    InvalidOverride { name: String, value: String },
}
