//! Error types for the embedding-to-layout pipeline.

use thiserror::Error;

/// Errors raised while storing, validating, or reducing embeddings.
///
/// Every variant aborts the whole batch: a layout is computed jointly over all
/// vectors, so there is no meaningful partial result to fall back to.
#[derive(Error, Debug)]
pub enum Error {
    /// A stored record line could not be parsed
    #[error("parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// A record's vector length differs from the rest of the dataset
    #[error("dimension mismatch for '{id}': expected {expected}, got {found}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        found: usize,
    },

    /// Too few samples for the requested neighbourhood size
    #[error(
        "insufficient samples: {samples} records is not more than perplexity {perplexity}"
    )]
    InsufficientSamples { samples: usize, perplexity: f64 },

    /// The same id appears twice in one dataset
    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    /// A record carries a zero-length vector
    #[error("record '{0}' has an empty vector")]
    EmptyVector(String),

    /// An id that cannot be written as a store field
    #[error("invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// NaN or infinity in a vector
    #[error("record '{id}' has a non-finite value at index {index}")]
    NonFiniteValue { id: String, index: usize },

    /// Out-of-range algorithm or encoder parameter
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using the pipeline Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
