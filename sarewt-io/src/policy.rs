//! What directory-wide operations do when a single file fails.

use crate::Result;
use log::warn;
use std::path::Path;

/// Per-file failure handling for directory-wide reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log recoverable failures and treat the file as contributing nothing.
    #[default]
    SkipAndLog,
    /// Propagate the first failure.
    Abort,
}

impl FailurePolicy {
    /// Resolves the outcome of reading `path`.
    ///
    /// `Ok(None)` means the file was skipped. Errors that are not confined
    /// to one file (see [`crate::Error::is_recoverable`]) always propagate.
    ///
    /// # Errors
    /// Returns the file's error under [`FailurePolicy::Abort`], or when the
    /// error is not recoverable.
    pub fn apply<T>(self, path: &Path, outcome: Result<T>) -> Result<Option<T>> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(err) if self == Self::SkipAndLog && err.is_recoverable() => {
                warn!("skipping {}: {err}", path.display());
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
