//! Named dijet feature schema.
//!
//! Maps the ordered feature names of an event feature matrix to column
//! indices. One schema is fixed for the lifetime of a dataset.

use crate::{Error, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Column layout of the event feature matrix written by the ntuplizer.
pub const DIJET_FEATURE_NAMES: [&str; 11] = [
    "mJJ",
    "j1Pt",
    "j1Eta",
    "j1Phi",
    "j1M",
    "j1E",
    "j2Pt",
    "j2M",
    "j2E",
    "DeltaEtaJJ",
    "DeltaPhiJJ",
];

/// Ordered feature names with index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::new(DIJET_FEATURE_NAMES.iter().map(|name| (*name).to_string()))
    }
}

impl FeatureSchema {
    /// Creates a schema from an ordered list of names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a schema from a label list and checks it against the
    /// width of the feature matrix it describes.
    ///
    /// # Errors
    /// Returns an error if the label count differs from `width`.
    pub fn for_width(names: &[String], width: usize) -> Result<Self> {
        if names.len() != width {
            return Err(Error::ShapeMismatch(format!(
                "{} feature names for {width} feature columns",
                names.len()
            )));
        }
        Ok(Self::new(names.iter().cloned()))
    }

    /// Column index of `name`.
    ///
    /// # Errors
    /// Returns an error if the schema has no such feature.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::MissingFeature(name.to_string()))
    }

    /// Feature names in column order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the schema has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
