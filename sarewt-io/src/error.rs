//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HDF5 library error (unreadable or corrupt container).
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Directory traversal error.
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Expected dataset key absent from a file.
    #[error("dataset '{key}' not found")]
    MissingDataset { key: String },

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] sarewt_core::Error),
}

impl Error {
    /// Returns true for failures confined to a single file: the file is
    /// unreadable, lacks a dataset, or does not line up with the rest of
    /// the directory. Directory-wide reads may skip such a file and go on.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io(_) | Error::Hdf5(_) | Error::MissingDataset { .. } | Error::InvalidFormat(_) => {
                true
            }
            Error::CoreError(sarewt_core::Error::ShapeMismatch(_)) => true,
            Error::Walk(_) | Error::ConfigError(_) | Error::CoreError(_) => false,
        }
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::CoreError(err.into())
    }
}
