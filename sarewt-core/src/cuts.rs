//! Selection engine: named kinematic cuts on the event feature matrix.
//!
//! A [`CutSpec`] holds threshold values for a set of [`Cut`]s. All cuts
//! are combined with a logical AND into a single keep-mask.

use crate::schema::FeatureSchema;
use crate::{Error, Result};
use ndarray::{ArrayView1, ArrayView2, Axis};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A selection criterion on the dijet features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Cut {
    /// `mJJ > t`
    Mjj,
    /// `j1Pt > t`
    J1Pt,
    /// `j2Pt > t`
    J2Pt,
    /// `j1Pt > t || j2Pt > t`
    JxPt,
    /// `|j1Eta| < t`
    J1Eta,
    /// `|DeltaEtaJJ + j1Eta| < t`
    J2Eta,
    /// `|DeltaEtaJJ| > t`
    Sideband,
    /// `|DeltaEtaJJ| <= t`
    SignalRegion,
}

impl Cut {
    /// Every cut the engine understands.
    pub const ALL: [Cut; 8] = [
        Cut::Mjj,
        Cut::J1Pt,
        Cut::J2Pt,
        Cut::JxPt,
        Cut::J1Eta,
        Cut::J2Eta,
        Cut::Sideband,
        Cut::SignalRegion,
    ];

    /// Key used for this cut in cut dictionaries and on the command line.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Cut::Mjj => "mJJ",
            Cut::J1Pt => "j1Pt",
            Cut::J2Pt => "j2Pt",
            Cut::JxPt => "jXPt",
            Cut::J1Eta => "j1Eta",
            Cut::J2Eta => "j2Eta",
            Cut::Sideband => "sideband",
            Cut::SignalRegion => "signalregion",
        }
    }
}

impl fmt::Display for Cut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Cut {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Cut::ALL
            .into_iter()
            .find(|cut| cut.key() == s)
            .ok_or_else(|| Error::UnknownCut(s.to_string()))
    }
}

/// Threshold values for a conjunction of cuts.
///
/// Each cut appears at most once; inserting it again replaces the value.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CutSpec {
    cuts: Vec<(Cut, f32)>,
}

impl CutSpec {
    /// An empty specification that keeps every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder variant of [`Self::insert`].
    #[must_use]
    pub fn with(mut self, cut: Cut, threshold: f32) -> Self {
        self.insert(cut, threshold);
        self
    }

    /// Sets the threshold for `cut`.
    pub fn insert(&mut self, cut: Cut, threshold: f32) {
        match self.cuts.iter_mut().find(|(c, _)| *c == cut) {
            Some(entry) => entry.1 = threshold,
            None => self.cuts.push((cut, threshold)),
        }
    }

    /// Sets a threshold by cut key.
    ///
    /// Unknown keys are ignored and leave the cuts unchanged;
    /// the return value tells whether the key was recognised.
    pub fn insert_named(&mut self, key: &str, threshold: f32) -> bool {
        match key.parse::<Cut>() {
            Ok(cut) => {
                self.insert(cut, threshold);
                true
            }
            Err(_) => false,
        }
    }

    /// Threshold configured for `cut`, if any.
    #[must_use]
    pub fn get(&self, cut: Cut) -> Option<f32> {
        self.cuts
            .iter()
            .find_map(|&(c, t)| (c == cut).then_some(t))
    }

    /// Iterates over `(cut, threshold)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Cut, f32)> + '_ {
        self.cuts.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Shorthand for [`compute_mask`].
    ///
    /// # Errors
    /// See [`compute_mask`].
    pub fn mask(&self, features: ArrayView2<'_, f32>, schema: &FeatureSchema) -> Result<Vec<bool>> {
        compute_mask(features, self, schema)
    }
}

impl<'a> FromIterator<(&'a str, f32)> for CutSpec {
    /// Collects `(key, threshold)` pairs, skipping unknown keys.
    fn from_iter<T: IntoIterator<Item = (&'a str, f32)>>(iter: T) -> Self {
        let mut spec = CutSpec::new();
        for (key, threshold) in iter {
            spec.insert_named(key, threshold);
        }
        spec
    }
}

/// Computes the keep-mask of `features` under `cuts`.
///
/// Starts from all-true and narrows it with every cut in turn. Supplying
/// both `sideband` and `signalregion` with the same threshold is legal and
/// yields an all-false mask.
///
/// # Errors
/// Returns an error if a cut needs a feature the schema does not name, or
/// if the schema points past the last feature column.
pub fn compute_mask(
    features: ArrayView2<'_, f32>,
    cuts: &CutSpec,
    schema: &FeatureSchema,
) -> Result<Vec<bool>> {
    let mut mask = vec![true; features.nrows()];

    for (cut, threshold) in cuts.iter() {
        match cut {
            Cut::Mjj | Cut::J1Pt | Cut::J2Pt => {
                let values = column(features, schema, cut.key())?;
                narrow(&mut mask, values, |v| v > threshold);
            }
            Cut::JxPt => {
                let j1 = column(features, schema, "j1Pt")?;
                let j2 = column(features, schema, "j2Pt")?;
                for ((keep, &a), &b) in mask.iter_mut().zip(j1).zip(j2) {
                    *keep &= a > threshold || b > threshold;
                }
            }
            Cut::J1Eta => {
                let values = column(features, schema, "j1Eta")?;
                narrow(&mut mask, values, |v| v.abs() < threshold);
            }
            Cut::J2Eta => {
                let delta = column(features, schema, "DeltaEtaJJ")?;
                let j1 = column(features, schema, "j1Eta")?;
                for ((keep, &d), &e) in mask.iter_mut().zip(delta).zip(j1) {
                    *keep &= (d + e).abs() < threshold;
                }
            }
            Cut::Sideband => {
                let values = column(features, schema, "DeltaEtaJJ")?;
                narrow(&mut mask, values, |v| v.abs() > threshold);
            }
            Cut::SignalRegion => {
                let values = column(features, schema, "DeltaEtaJJ")?;
                narrow(&mut mask, values, |v| v.abs() <= threshold);
            }
        }
    }

    Ok(mask)
}

fn column<'a>(
    features: ArrayView2<'a, f32>,
    schema: &FeatureSchema,
    name: &str,
) -> Result<ArrayView1<'a, f32>> {
    let idx = schema.index_of(name)?;
    if idx >= features.ncols() {
        return Err(Error::ShapeMismatch(format!(
            "feature '{name}' maps to column {idx} but only {} columns are present",
            features.ncols()
        )));
    }
    Ok(features.index_axis_move(Axis(1), idx))
}

fn narrow<F>(mask: &mut [bool], values: ArrayView1<'_, f32>, pass: F)
where
    F: Fn(f32) -> bool,
{
    for (keep, &v) in mask.iter_mut().zip(values) {
        *keep &= pass(v);
    }
}
