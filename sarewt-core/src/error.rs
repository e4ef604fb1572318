//! Error types for sarewt-core.

use thiserror::Error;

/// Result type alias for sarewt operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for sarewt operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Cut name not recognised by the selection engine.
    #[error("unknown cut: {0}")]
    UnknownCut(String),

    /// Feature name not present in the schema.
    #[error("feature '{0}' not present in feature schema")]
    MissingFeature(String),

    /// Arrays that must line up do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::ShapeMismatch(err.to_string())
    }
}
