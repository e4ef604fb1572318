//! Paired constituent and feature arrays for a set of dijet events.
//!
//! `EventBatch` keeps the particle constituent tensor `[N, jets, particles,
//! particle_features]`, the event feature matrix `[N, features]` and an
//! optional truth-label vector row-aligned. Every operation that drops,
//! reorders or splits rows applies the same row selection to all of them.

use crate::{Error, Result};
use ndarray::{concatenate, Array1, Array2, Array4, Axis, Slice};
use std::mem::size_of;

/// Number of jets stored per event.
pub const JETS_PER_EVENT: usize = 2;

/// Number of (zero padded) particle slots per jet.
pub const PARTICLES_PER_JET: usize = 100;

/// Row-aligned constituents, features and optional truth labels.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    constituents: Array4<f32>,
    features: Array2<f32>,
    truth_labels: Option<Array1<f32>>,
}

impl EventBatch {
    /// Pairs a constituent tensor with its feature matrix.
    ///
    /// # Errors
    /// Returns an error if the two arrays have different row counts.
    pub fn new(constituents: Array4<f32>, features: Array2<f32>) -> Result<Self> {
        let n_const = constituents.len_of(Axis(0));
        let n_feat = features.nrows();
        if n_const != n_feat {
            return Err(Error::ShapeMismatch(format!(
                "{n_const} constituent rows vs {n_feat} feature rows"
            )));
        }
        Ok(Self {
            constituents,
            features,
            truth_labels: None,
        })
    }

    /// Attaches a per-event truth-label vector.
    ///
    /// # Errors
    /// Returns an error if the label count differs from the event count.
    pub fn with_truth_labels(mut self, labels: Array1<f32>) -> Result<Self> {
        if labels.len() != self.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} truth labels for {} events",
                labels.len(),
                self.len()
            )));
        }
        self.truth_labels = Some(labels);
        Ok(self)
    }

    /// An empty batch with the standard jet/particle layout.
    #[must_use]
    pub fn empty(particle_features: usize, event_features: usize) -> Self {
        Self {
            constituents: Array4::zeros((0, JETS_PER_EVENT, PARTICLES_PER_JET, particle_features)),
            features: Array2::zeros((0, event_features)),
            truth_labels: None,
        }
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    /// Returns true if the batch holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn constituents(&self) -> &Array4<f32> {
        &self.constituents
    }

    #[must_use]
    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    #[must_use]
    pub fn truth_labels(&self) -> Option<&Array1<f32>> {
        self.truth_labels.as_ref()
    }

    /// Consumes the batch, returning `(constituents, features, truth_labels)`.
    #[must_use]
    pub fn into_parts(self) -> (Array4<f32>, Array2<f32>, Option<Array1<f32>>) {
        (self.constituents, self.features, self.truth_labels)
    }

    /// In-memory footprint of the array payloads in bytes.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        let truth = self.truth_labels.as_ref().map_or(0, Array1::len);
        (self.constituents.len() + self.features.len() + truth) * size_of::<f32>()
    }

    /// Footprint of a single event in bytes, derived from the trailing shapes.
    #[must_use]
    pub fn bytes_per_event(&self) -> usize {
        let per_event_constituents: usize = self.constituents.shape()[1..].iter().product();
        let truth = usize::from(self.truth_labels.is_some());
        (per_event_constituents + self.features.ncols() + truth) * size_of::<f32>()
    }

    /// Keeps the events whose mask entry is true, in their original order.
    ///
    /// # Errors
    /// Returns an error if the mask length differs from the event count.
    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(Error::ShapeMismatch(format!(
                "mask of length {} for {} events",
                mask.len(),
                self.len()
            )));
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Ok(self.take(&indices))
    }

    /// Gathers the events at `indices`, in the order given.
    ///
    /// # Panics
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            constituents: self.constituents.select(Axis(0), indices),
            features: self.features.select(Axis(0), indices),
            truth_labels: self
                .truth_labels
                .as_ref()
                .map(|labels| labels.select(Axis(0), indices)),
        }
    }

    /// Splits into the first `n` events and the remainder.
    ///
    /// `n` is clamped to the batch length.
    #[must_use]
    pub fn split_at(self, n: usize) -> (Self, Self) {
        let n = n.min(self.len());
        let head = self.rows(Slice::from(..n));
        let tail = self.rows(Slice::from(n..));
        (head, tail)
    }

    /// Drops every event past the first `n`.
    pub fn truncate(&mut self, n: usize) {
        if n < self.len() {
            *self = self.rows(Slice::from(..n));
        }
    }

    /// Checks that `other` has the same per-event layout as `self`.
    ///
    /// Empty batches are compatible with anything.
    ///
    /// # Errors
    /// Returns an error if the constituent shapes or feature widths differ,
    /// or if only one of the two batches carries truth labels.
    pub fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.is_empty() || other.is_empty() {
            return Ok(());
        }
        if self.constituents.shape()[1..] != other.constituents.shape()[1..] {
            return Err(Error::ShapeMismatch(format!(
                "constituent shape {:?} does not match {:?}",
                &other.constituents.shape()[1..],
                &self.constituents.shape()[1..]
            )));
        }
        if self.features.ncols() != other.features.ncols() {
            return Err(Error::ShapeMismatch(format!(
                "{} features do not match {} features",
                other.features.ncols(),
                self.features.ncols()
            )));
        }
        if self.truth_labels.is_some() != other.truth_labels.is_some() {
            return Err(Error::ShapeMismatch(
                "truth labels present in only one of the batches".to_string(),
            ));
        }
        Ok(())
    }

    /// Appends the events of `other` after the events of `self`.
    ///
    /// An empty batch adopts the layout of whatever is appended to it.
    /// On error `self` is left unchanged.
    ///
    /// # Errors
    /// Returns an error if the batches are not compatible, see
    /// [`Self::check_compatible`].
    pub fn append(&mut self, other: &Self) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other.clone();
            return Ok(());
        }
        self.check_compatible(other)?;

        self.constituents
            .append(Axis(0), other.constituents.view())?;
        self.features.append(Axis(0), other.features.view())?;
        if let (Some(mine), Some(theirs)) = (self.truth_labels.as_mut(), &other.truth_labels) {
            mine.append(Axis(0), theirs.view())?;
        }
        Ok(())
    }

    /// Concatenates batches in order.
    ///
    /// Empty batches are dropped unless every batch is empty, in which case
    /// the first one is returned. `None` means no batch was given at all.
    ///
    /// # Errors
    /// Returns an error if any two non-empty batches are not compatible.
    pub fn concat<I>(batches: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut batches: Vec<Self> = batches.into_iter().collect();
        if batches.iter().all(Self::is_empty) {
            return Ok(batches.into_iter().next());
        }
        batches.retain(|b| !b.is_empty());
        let first = &batches[0];
        for batch in &batches[1..] {
            first.check_compatible(batch)?;
        }
        if batches.len() == 1 {
            return Ok(batches.pop());
        }

        let constituents: Vec<_> = batches.iter().map(|b| b.constituents.view()).collect();
        let features: Vec<_> = batches.iter().map(|b| b.features.view()).collect();
        let truth_labels = if first.truth_labels.is_some() {
            let views: Vec<_> = batches
                .iter()
                .filter_map(|b| b.truth_labels.as_ref().map(|a| a.view()))
                .collect();
            Some(concatenate(Axis(0), &views)?)
        } else {
            None
        };

        Ok(Some(Self {
            constituents: concatenate(Axis(0), &constituents)?,
            features: concatenate(Axis(0), &features)?,
            truth_labels,
        }))
    }

    /// Splits into `parts` consecutive batches whose sizes differ by at
    /// most one, larger parts first.
    ///
    /// Returns no parts when `parts` is 0.
    #[must_use]
    pub fn split_even(&self, parts: usize) -> Vec<Self> {
        if parts == 0 {
            return Vec::new();
        }
        let base = self.len() / parts;
        let extra = self.len() % parts;

        let mut out = Vec::with_capacity(parts);
        let mut start = 0;
        for part in 0..parts {
            let size = base + usize::from(part < extra);
            out.push(self.rows(Slice::from(start..start + size)));
            start += size;
        }
        out
    }

    fn rows(&self, slice: Slice) -> Self {
        Self {
            constituents: self.constituents.slice_axis(Axis(0), slice).to_owned(),
            features: self.features.slice_axis(Axis(0), slice).to_owned(),
            truth_labels: self
                .truth_labels
                .as_ref()
                .map(|labels| labels.slice_axis(Axis(0), slice).to_owned()),
        }
    }
}
